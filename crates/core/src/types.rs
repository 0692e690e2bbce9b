/// 1-based worker identifier, assigned in spawn order.
pub type WorkerId = u32;

/// Opaque magnitude of a task's simulated cost. Zero is reserved for the
/// stop sentinel.
pub type Effort = u32;
