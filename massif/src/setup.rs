//! Device bring-up: adapter enumeration, feature checks, device creation.

use std::sync::Arc;

use arrayvec::ArrayVec;
use thiserror::Error;
use wgpu::{
    Adapter, AdapterInfo, Backend, Backends, Device, DeviceDescriptor, DeviceType, Features,
    Instance, InstanceDescriptor, Limits, Queue,
};

#[derive(Error, Debug)]
pub enum InitializationError {
    #[error("no supported adapter found")]
    MissingAdapter,
    #[error("adapter is missing required features: {features:?}")]
    MissingDeviceFeatures { features: Features },
    #[error("requesting a device failed")]
    RequestDeviceFailed,
}

/// Features the core cannot run without.
///
/// `INDIRECT_FIRST_INSTANCE` is load-bearing: each draw command addresses
/// its slice of the remap buffer through the `first_instance` field of the
/// indirect command, which is what lets one command draw a non-contiguous
/// set of instance transforms with zero per-frame CPU work.
pub fn required_features() -> Features {
    Features::INDIRECT_FIRST_INSTANCE
}

/// Bundle of the always-used gpu objects.
pub struct InstanceAdapterDevice {
    pub instance: Arc<Instance>,
    pub adapter: Arc<Adapter>,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
    pub info: AdapterInfo,
}

/// Enumerates adapters, prefers the most capable device class, verifies the
/// required features and requests a device.
pub async fn create_iad(
    desired_backend: Option<Backend>,
) -> Result<InstanceAdapterDevice, InitializationError> {
    profiling::scope!("create_iad");

    let instance = Instance::new(InstanceDescriptor {
        backends: Backends::all(),
        ..Default::default()
    });

    let mut candidates = ArrayVec::<Adapter, 8>::new();
    for adapter in instance.enumerate_adapters(Backends::all()) {
        let info = adapter.get_info();
        if let Some(desired) = desired_backend {
            if info.backend != desired {
                log::debug!("skipping adapter {} on unwanted {:?}", info.name, info.backend);
                continue;
            }
        }
        log::debug!("found adapter {} on {:?}", info.name, info.backend);
        if candidates.is_full() {
            break;
        }
        candidates.push(adapter);
    }

    candidates.sort_by_key(|adapter| match adapter.get_info().device_type {
        DeviceType::DiscreteGpu => 0,
        DeviceType::IntegratedGpu => 1,
        DeviceType::VirtualGpu => 2,
        DeviceType::Cpu => 3,
        DeviceType::Other => 4,
    });

    if candidates.is_empty() {
        return Err(InitializationError::MissingAdapter);
    }

    let required = required_features();
    let mut missing_on_best: Option<Features> = None;

    for adapter in candidates {
        let missing = required - adapter.features();
        if !missing.is_empty() {
            log::debug!(
                "adapter {} is missing features {:?}",
                adapter.get_info().name,
                missing
            );
            missing_on_best.get_or_insert(missing);
            continue;
        }

        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("massif device"),
                    required_features: required,
                    required_limits: Limits::default(),
                },
                None,
            )
            .await
            .map_err(|_| InitializationError::RequestDeviceFailed)?;

        log::debug!("chosen adapter: {} ({:?})", info.name, info.backend);

        return Ok(InstanceAdapterDevice {
            instance: Arc::new(instance),
            adapter: Arc::new(adapter),
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
        });
    }

    match missing_on_best {
        Some(features) => Err(InitializationError::MissingDeviceFeatures { features }),
        None => Err(InitializationError::MissingAdapter),
    }
}
