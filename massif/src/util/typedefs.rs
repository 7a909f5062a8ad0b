/// Hash map designed for small keys.
pub type FastHashMap<K, V> = fnv::FnvHashMap<K, V>;
