use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::core::DynamicObject;

/// Transforms the rendered child resources before they are applied.
/// Implementations must be pure functions of their inputs and must not
/// remove or reorder children unless that is their documented purpose.
pub trait ChildResourcePatcher: Send + Sync {
    fn patch(
        &self,
        composite: &DynamicObject,
        children: Vec<DynamicObject>,
    ) -> anyhow::Result<Vec<DynamicObject>>;
}

/// Lets a plain function stand in wherever a [`ChildResourcePatcher`]
/// is expected.
pub struct PatcherFn<F>(pub F);

impl<F> ChildResourcePatcher for PatcherFn<F>
where
    F: Fn(&DynamicObject, Vec<DynamicObject>) -> anyhow::Result<Vec<DynamicObject>>
        + Send
        + Sync,
{
    fn patch(
        &self,
        composite: &DynamicObject,
        children: Vec<DynamicObject>,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        (self.0)(composite, children)
    }
}

/// Applies member patchers strictly in order, feeding each patcher's output
/// to the next. The first failure aborts the chain; partial output is
/// discarded and the member's error is returned unchanged.
pub struct PatcherChain {
    members: Vec<Box<dyn ChildResourcePatcher>>,
}

impl PatcherChain {
    pub fn new(members: Vec<Box<dyn ChildResourcePatcher>>) -> Self {
        Self { members }
    }
}

impl ChildResourcePatcher for PatcherChain {
    fn patch(
        &self,
        composite: &DynamicObject,
        children: Vec<DynamicObject>,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        let mut current = children;
        for member in &self.members {
            current = member.patch(composite, current)?;
        }
        Ok(current)
    }
}

/// Stamps every child with a controller owner reference pointing at the
/// composite, so children are garbage-collected with it. Deletion of the
/// composite is blocked until its dependents are finalized.
pub struct OwnerReferenceAdder;

impl ChildResourcePatcher for OwnerReferenceAdder {
    fn patch(
        &self,
        composite: &DynamicObject,
        mut children: Vec<DynamicObject>,
    ) -> anyhow::Result<Vec<DynamicObject>> {
        let reference = controller_reference(composite);
        for child in children.iter_mut() {
            let mut refs =
                child.metadata.owner_references.take().unwrap_or_default();
            // Exactly one controller reference must remain.
            refs.retain(|r| {
                r.controller != Some(true) && r.uid != reference.uid
            });
            refs.push(reference.clone());
            child.metadata.owner_references = Some(refs);
        }
        Ok(children)
    }
}

fn controller_reference(composite: &DynamicObject) -> OwnerReference {
    let types = composite.types.clone().unwrap_or_default();
    OwnerReference {
        api_version: types.api_version,
        kind: types.kind,
        name: composite.name_any(),
        uid: composite.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use kube::core::GroupVersionKind;
    use kube::discovery::ApiResource;

    use super::*;

    fn composite(name: &str, uid: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(
            "example.org",
            "v1alpha1",
            "CompositeDB",
        ));
        let mut cr = DynamicObject::new(name, &ar);
        cr.metadata.uid = Some(uid.to_string());
        cr
    }

    fn child(kind: &str, name: &str) -> DynamicObject {
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(
            "example.org",
            "v1alpha1",
            kind,
        ));
        DynamicObject::new(name, &ar)
    }

    #[test]
    fn adds_exactly_one_controller_reference() {
        let cr = composite("db-1", "uid-1");
        let out = OwnerReferenceAdder
            .patch(&cr, vec![child("Bucket", "b1"), child("Bucket", "b2")])
            .unwrap();

        assert_eq!(out.len(), 2);
        for o in &out {
            let refs = o.metadata.owner_references.as_ref().unwrap();
            assert_eq!(refs.len(), 1);
            let r = &refs[0];
            assert_eq!(r.api_version, "example.org/v1alpha1");
            assert_eq!(r.kind, "CompositeDB");
            assert_eq!(r.name, "db-1");
            assert_eq!(r.uid, "uid-1");
            assert_eq!(r.controller, Some(true));
            assert_eq!(r.block_owner_deletion, Some(true));
        }
    }

    #[test]
    fn replaces_existing_controller_reference() {
        let cr = composite("db-1", "uid-1");
        let mut orphan = child("Bucket", "b1");
        orphan.metadata.owner_references = Some(vec![
            OwnerReference {
                api_version: "example.org/v1alpha1".into(),
                kind: "CompositeDB".into(),
                name: "db-0".into(),
                uid: "uid-0".into(),
                controller: Some(true),
                block_owner_deletion: Some(true),
            },
            OwnerReference {
                api_version: "v1".into(),
                kind: "ConfigMap".into(),
                name: "settings".into(),
                uid: "uid-cfg".into(),
                ..Default::default()
            },
        ]);

        let out = OwnerReferenceAdder.patch(&cr, vec![orphan]).unwrap();
        let refs = out[0].metadata.owner_references.as_ref().unwrap();
        let controllers: Vec<_> =
            refs.iter().filter(|r| r.controller == Some(true)).collect();
        assert_eq!(controllers.len(), 1);
        assert_eq!(controllers[0].uid, "uid-1");
        // The unrelated non-controller reference survives.
        assert!(refs.iter().any(|r| r.uid == "uid-cfg"));
    }

    #[test]
    fn chain_feeds_output_forward_in_order() {
        let cr = composite("db-1", "uid-1");
        let first = PatcherFn(
            |_: &DynamicObject,
             mut list: Vec<DynamicObject>|
             -> anyhow::Result<Vec<DynamicObject>> {
                for c in list.iter_mut() {
                    c.labels_mut().insert("stage".into(), "first".into());
                }
                Ok(list)
            },
        );
        let second = PatcherFn(
            |_: &DynamicObject,
             mut list: Vec<DynamicObject>|
             -> anyhow::Result<Vec<DynamicObject>> {
                for c in list.iter_mut() {
                    let seen =
                        c.labels().get("stage").cloned().unwrap_or_default();
                    c.labels_mut().insert("seen-by-second".into(), seen);
                }
                Ok(list)
            },
        );
        let chain =
            PatcherChain::new(vec![Box::new(first), Box::new(second)]);

        let out = chain.patch(&cr, vec![child("Bucket", "b1")]).unwrap();
        assert_eq!(out[0].labels().get("stage").unwrap(), "first");
        assert_eq!(out[0].labels().get("seen-by-second").unwrap(), "first");
    }

    #[test]
    fn chain_aborts_on_first_failure() {
        static SECOND_RAN: AtomicBool = AtomicBool::new(false);

        let cr = composite("db-1", "uid-1");
        let failing = PatcherFn(
            |_: &DynamicObject,
             _: Vec<DynamicObject>|
             -> anyhow::Result<Vec<DynamicObject>> {
                Err(anyhow::anyhow!("boom"))
            },
        );
        let recording = PatcherFn(
            |_: &DynamicObject,
             list: Vec<DynamicObject>|
             -> anyhow::Result<Vec<DynamicObject>> {
                SECOND_RAN.store(true, Ordering::SeqCst);
                Ok(list)
            },
        );
        let chain =
            PatcherChain::new(vec![Box::new(failing), Box::new(recording)]);

        let err = chain
            .patch(&cr, vec![child("Bucket", "b1")])
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!SECOND_RAN.load(Ordering::SeqCst));
    }
}
