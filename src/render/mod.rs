pub mod bundle;
pub mod camera;
pub mod context;
pub mod culling;
pub mod gpu;
pub mod material;
pub mod mesh;
pub mod shader;
pub mod state;
pub mod texture;

/// Declares an opaque identity token handed out once per resource. Batching
/// and the GPU caches key on these rather than on structural equality.
macro_rules! resource_id {
    ($($name:ident),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(u64);

            impl $name {
                pub(crate) fn next() -> Self {
                    use std::sync::atomic::{AtomicU64, Ordering};
                    static NEXT: AtomicU64 = AtomicU64::new(1);
                    Self(NEXT.fetch_add(1, Ordering::Relaxed))
                }
            }
        )*
    };
}

resource_id!(MaterialId, MeshId, ProgramId, TextureId);
