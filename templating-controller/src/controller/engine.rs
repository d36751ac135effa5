use async_trait::async_trait;
use kube::core::DynamicObject;

/// The rendering engine capability: turn a composite resource into the
/// child resources it should be composed of. Manifest semantics belong to
/// the engine; the reconciler only needs an ordered list back.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run(
        &self,
        composite: &DynamicObject,
    ) -> anyhow::Result<Vec<DynamicObject>>;
}

/// Default engine; renders no child resources.
pub struct NopEngine;

#[async_trait]
impl Engine for NopEngine {
    async fn run(
        &self,
        _composite: &DynamicObject,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        Ok(Vec::new())
    }
}

/// Lets a plain function stand in wherever an [`Engine`] is expected.
pub struct EngineFn<F>(pub F);

#[async_trait]
impl<F> Engine for EngineFn<F>
where
    F: Fn(&DynamicObject) -> anyhow::Result<Vec<DynamicObject>>
        + Send
        + Sync,
{
    async fn run(
        &self,
        composite: &DynamicObject,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        (self.0)(composite)
    }
}
