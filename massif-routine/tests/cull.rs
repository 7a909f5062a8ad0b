//! GPU tests for the compute culling pass and the frame driver. Each test
//! skips when no usable adapter is present.

use anyhow::{Context, Result};
use glam::{Mat4, Quat, UVec2, Vec3};
use massif::{
    create_iad, Camera, CameraProjection, CameraState, CapacityConfig, GeometryPool,
    InstanceAdapterDevice,
};
use massif_routine::{InstanceCuller, SceneRenderer};
use massif_types::{Handedness, MeshData, Vertex};

fn test_iad() -> Option<InstanceAdapterDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    match pollster::block_on(create_iad(None)) {
        Ok(iad) => Some(iad),
        Err(err) => {
            eprintln!("skipping gpu test: {err}");
            None
        }
    }
}

fn test_pool(iad: &InstanceAdapterDevice) -> GeometryPool {
    GeometryPool::new(
        iad.device.clone(),
        iad.queue.clone(),
        CapacityConfig {
            max_vertices: 1 << 12,
            max_indices: 1 << 12,
            max_instances: 1 << 12,
            max_commands: 64,
        },
    )
}

/// A quad whose bounding sphere is exactly radius 0.5 around the origin.
fn half_quad() -> MeshData {
    MeshData::new(
        vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::Z),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::Z),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::Z),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::Z),
        ],
        vec![0, 1, 2, 0, 2, 3],
    )
}

/// Camera at the world origin looking along +Z, 90 degree fov, near 0.1,
/// far 100.
fn s3_view_proj() -> Mat4 {
    let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
    proj * view
}

fn at(position: Vec3) -> Mat4 {
    Mat4::from_translation(position)
}

fn read_buffer_u32(iad: &InstanceAdapterDevice, buffer: &wgpu::Buffer, bytes: u64) -> Vec<u32> {
    let staging = iad.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test readback"),
        size: bytes,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = iad
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test readback encoder"),
        });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, bytes);
    let submit = iad.queue.submit(Some(encoder.finish()));

    let (sender, receiver) = flume::bounded(1);
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).unwrap()
        });
    iad.device
        .poll(wgpu::Maintain::WaitForSubmissionIndex(submit));
    receiver.recv().unwrap().unwrap();

    let mapping = staging.slice(..).get_mapped_range();
    bytemuck::cast_slice(&mapping).to_vec()
}

/// Runs a cull over the pool and returns the post-cull
/// `(first_instance, instance_count)` of every command.
fn run_cull(
    iad: &InstanceAdapterDevice,
    culler: &InstanceCuller,
    pool: &GeometryPool,
    view_proj: Mat4,
) -> Vec<(u32, u32)> {
    let mut encoder = iad
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test cull encoder"),
        });
    culler.cull(&iad.queue, &mut encoder, pool, view_proj);
    iad.queue.submit(Some(encoder.finish()));

    let words = read_buffer_u32(
        iad,
        &pool.buffers().indirect,
        pool.draw_command_count() as u64 * 20,
    );
    words.chunks_exact(5).map(|c| (c[4], c[1])).collect()
}

#[test]
fn culls_instances_behind_the_camera() -> Result<()> {
    let Some(iad) = test_iad() else {
        return Ok(());
    };
    let mut pool = test_pool(&iad);
    let mesh = pool.append_mesh(&half_quad()).context("append mesh")?;

    // B behind the camera first, A ahead of it second. A landing in slot 0
    // proves the cull pass rewrote the remap region rather than leaving the
    // finalize-time layout in place.
    let start = pool.append_instances(
        &[at(Vec3::new(0.0, 0.0, -10.0)), at(Vec3::new(0.0, 0.0, 10.0))],
        &[1, 2],
    )?;
    pool.record_command_instances(mesh.command_index, start, 2);
    pool.finalize();

    let culler = InstanceCuller::new(&iad.device, &pool);
    let counts = run_cull(&iad, &culler, &pool, s3_view_proj());

    assert_eq!(counts, vec![(0, 1)]);
    let remap = read_buffer_u32(&iad, &pool.buffers().remap, 4);
    assert_eq!(remap, vec![1], "the surviving slot must hold instance A");

    Ok(())
}

#[test]
fn straddling_sphere_is_not_culled() -> Result<()> {
    let Some(iad) = test_iad() else {
        return Ok(());
    };
    let mut pool = test_pool(&iad);
    let mesh = pool.append_mesh(&half_quad()).context("append mesh")?;

    // B's world sphere has radius 50: it pokes through every frustum plane
    // at once and must still count as visible.
    let giant = Mat4::from_scale_rotation_translation(
        Vec3::splat(100.0),
        Quat::IDENTITY,
        Vec3::new(0.0, 0.0, 10.0),
    );
    let start =
        pool.append_instances(&[at(Vec3::new(0.0, 0.0, 10.0)), giant], &[1, 2])?;
    pool.record_command_instances(mesh.command_index, start, 2);
    pool.finalize();

    let culler = InstanceCuller::new(&iad.device, &pool);
    let counts = run_cull(&iad, &culler, &pool, s3_view_proj());

    assert_eq!(counts, vec![(0, 2)]);

    Ok(())
}

#[test]
fn cull_stays_inside_finalized_regions_and_is_repeatable() -> Result<()> {
    let Some(iad) = test_iad() else {
        return Ok(());
    };
    let mut pool = test_pool(&iad);
    let mesh_a = pool.append_mesh(&half_quad()).context("append mesh A")?;
    let mesh_b = pool.append_mesh(&half_quad()).context("append mesh B")?;

    // Interleaved chunks: command 0 owns instances {0, 1, 4}, command 1
    // owns {2, 3}. Instances 1 and 3 sit behind the camera.
    let start = pool.append_instances(
        &[at(Vec3::new(0.0, 0.0, 10.0)), at(Vec3::new(0.0, 0.0, -10.0))],
        &[0, 1],
    )?;
    pool.record_command_instances(mesh_a.command_index, start, 2);
    let start = pool.append_instances(
        &[at(Vec3::new(0.0, 0.0, 20.0)), at(Vec3::new(0.0, 0.0, -20.0))],
        &[2, 3],
    )?;
    pool.record_command_instances(mesh_b.command_index, start, 2);
    let start = pool.append_instances(&[at(Vec3::new(0.0, 1.0, 10.0))], &[4])?;
    pool.record_command_instances(mesh_a.command_index, start, 1);
    pool.finalize();

    let finalized: Vec<(u32, u32)> = pool
        .commands()
        .iter()
        .map(|c| (c.first_instance, c.instance_count))
        .collect();
    assert_eq!(finalized, vec![(0, 3), (3, 2)]);

    let culler = InstanceCuller::new(&iad.device, &pool);
    let first = run_cull(&iad, &culler, &pool, s3_view_proj());
    let second = run_cull(&iad, &culler, &pool, s3_view_proj());

    // Same uniform, same survivors: the reset pass makes culling
    // repeatable instead of accumulative.
    assert_eq!(first, second);

    for (&(base, count), &(finalized_base, finalized_count)) in first.iter().zip(&finalized) {
        assert_eq!(base, finalized_base, "first_instance never moves after finalize");
        assert!(count <= finalized_count, "cull output is bounded by the region size");
    }
    assert_eq!(first[0].1, 2);
    assert_eq!(first[1].1, 1);

    // Each region holds only instances finalized under that command.
    let remap = read_buffer_u32(&iad, &pool.buffers().remap, 5 * 4);
    let mut command_0: Vec<u32> = remap[0..2].to_vec();
    command_0.sort_unstable();
    assert_eq!(command_0, vec![0, 4]);
    assert_eq!(remap[3], 2);

    Ok(())
}

#[test]
fn renderer_draws_finalized_pool_and_skips_unfinalized() -> Result<()> {
    let Some(iad) = test_iad() else {
        return Ok(());
    };

    let size = UVec2::splat(64);
    let target_texture = iad.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("test target"),
        size: wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let target = target_texture.create_view(&wgpu::TextureViewDescriptor::default());

    // Rendering an unfinalized pool records nothing and must not panic.
    let unfinalized = test_pool(&iad);
    let mut renderer = SceneRenderer::new(
        iad.device.clone(),
        iad.queue.clone(),
        &unfinalized,
        wgpu::TextureFormat::Rgba8UnormSrgb,
        Handedness::Right,
        size,
    );
    renderer.render(&unfinalized, &target, Mat4::IDENTITY, Vec3::ZERO, 0.0);

    // A finalized pool with one quad right in front of the camera.
    let mut pool = test_pool(&iad);
    let mesh = pool.append_mesh(&half_quad()).context("append mesh")?;
    let start = pool.append_instances(&[at(Vec3::new(0.0, 0.0, -10.0))], &[7])?;
    pool.record_command_instances(mesh.command_index, start, 1);
    pool.finalize();

    let camera = CameraState::new(
        Camera {
            projection: CameraProjection::Perspective {
                vfov_degrees: 90.0,
                near: 0.1,
            },
            view: Mat4::IDENTITY,
        },
        Handedness::Right,
        1.0,
    );

    let mut renderer = SceneRenderer::new(
        iad.device.clone(),
        iad.queue.clone(),
        &pool,
        wgpu::TextureFormat::Rgba8UnormSrgb,
        Handedness::Right,
        size,
    );
    renderer.render(&pool, &target, camera.view_proj(), camera.location(), 0.0);

    // Read the frame back and check the quad covered the center pixel.
    let bytes_per_row = size.x * 4;
    let staging = iad.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("frame readback"),
        size: (bytes_per_row * size.y) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = iad
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame readback encoder"),
        });
    encoder.copy_texture_to_buffer(
        target_texture.as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: None,
            },
        },
        wgpu::Extent3d {
            width: size.x,
            height: size.y,
            depth_or_array_layers: 1,
        },
    );
    let submit = iad.queue.submit(Some(encoder.finish()));

    let (sender, receiver) = flume::bounded(1);
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).unwrap()
        });
    iad.device
        .poll(wgpu::Maintain::WaitForSubmissionIndex(submit));
    receiver.recv().unwrap().unwrap();

    let mapping = staging.slice(..).get_mapped_range();
    let center = ((size.y / 2) * size.x + size.x / 2) as usize * 4;
    let pixel = &mapping[center..center + 4];
    assert!(
        pixel[0] > 0 || pixel[1] > 0 || pixel[2] > 0,
        "center pixel should be covered by the instance, got {pixel:?}"
    );

    Ok(())
}
