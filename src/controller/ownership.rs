//! Owner references for managed objects
//!
//! A managed Deployment carries exactly one controller reference pointing at
//! the NginxOperator that produced it, so the API server's garbage collector
//! removes the Deployment when the NginxOperator is deleted.

use std::collections::BTreeSet;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::Error;

/// The set of owner kinds this process is allowed to set references for
#[derive(Clone, Debug, Default)]
pub struct Scheme {
    kinds: BTreeSet<(String, String)>,
}

impl Scheme {
    /// Create an empty scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type
    pub fn register<K: Resource<DynamicType = ()>>(mut self) -> Self {
        self.kinds
            .insert((K::api_version(&()).into_owned(), K::kind(&()).into_owned()));
        self
    }

    /// True if (apiVersion, kind) was registered
    pub fn recognizes(&self, api_version: &str, kind: &str) -> bool {
        self.kinds
            .contains(&(api_version.to_string(), kind.to_string()))
    }
}

/// Make `owner` the controller of the object described by `child`.
///
/// An existing reference to the same owner (by uid) is replaced; a controller
/// reference to any other object is an error.
pub fn set_controller_reference<K>(
    scheme: &Scheme,
    owner: &K,
    child: &mut ObjectMeta,
) -> Result<(), Error>
where
    K: Resource<DynamicType = ()>,
{
    let api_version = K::api_version(&());
    let kind = K::kind(&());
    if !scheme.recognizes(&api_version, &kind) {
        return Err(Error::Scheme {
            api_version: api_version.into_owned(),
            kind: kind.into_owned(),
        });
    }

    let child_name = child.name.clone().unwrap_or_default();

    let mut owner_ref: OwnerReference = owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::ownership(
            &child_name,
            format!("{kind} {} has no name or uid", owner.name_any()),
        )
    })?;
    owner_ref.block_owner_deletion = Some(true);

    let owner_ns = owner.meta().namespace.as_deref();
    if let (Some(owner_ns), Some(child_ns)) = (owner_ns, child.namespace.as_deref()) {
        if owner_ns != child_ns {
            return Err(Error::ownership(
                &child_name,
                format!(
                    "cross-namespace owner {owner_ns}/{} not allowed in {child_ns}",
                    owner_ref.name
                ),
            ));
        }
    }

    let refs = child.owner_references.get_or_insert_with(Vec::new);

    if let Some(other) = refs
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner_ref.uid)
    {
        return Err(Error::ownership(
            &child_name,
            format!("already controlled by {} {}", other.kind, other.name),
        ));
    }

    match refs.iter_mut().find(|r| r.uid == owner_ref.uid) {
        Some(existing) => *existing = owner_ref,
        None => refs.push(owner_ref),
    }

    Ok(())
}
