//! The view of one in-flight operation handed to admission plugins.

use foundry_core::{ApiObject, GroupKind, GroupVersionKind, Kind, Operation, ResourceDescriptor, UserInfo};

/// Operation, target resource, namespace, name, candidate and prior object,
/// requesting user and dry-run flag. Only mutating plugins get the object mutably.
pub struct Attributes<'a> {
    operation: Operation,
    descriptor: &'a ResourceDescriptor,
    namespace: &'a str,
    name: &'a str,
    object: Option<&'a mut (dyn ApiObject + 'static)>,
    old: Option<&'a (dyn ApiObject + 'static)>,
    user: Option<&'a UserInfo>,
    dry_run: bool,
}

impl<'a> Attributes<'a> {
    pub fn new(operation: Operation, descriptor: &'a ResourceDescriptor, namespace: &'a str, name: &'a str) -> Self {
        Self { operation, descriptor, namespace, name, object: None, old: None, user: None, dry_run: false }
    }

    pub fn with_object(mut self, object: &'a mut (dyn ApiObject + 'static)) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_old(mut self, old: &'a (dyn ApiObject + 'static)) -> Self {
        self.old = Some(old);
        self
    }

    pub fn with_user(mut self, user: Option<&'a UserInfo>) -> Self {
        self.user = user;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn operation(&self) -> Operation { self.operation }
    pub fn descriptor(&self) -> &ResourceDescriptor { self.descriptor }
    pub fn kind(&self) -> GroupVersionKind { self.descriptor.gvk() }
    pub fn group_kind(&self) -> GroupKind { self.descriptor.group_kind() }
    /// Group-qualified plural of the target resource.
    pub fn resource(&self) -> String { self.descriptor.qualified_resource() }
    pub fn namespace(&self) -> &str { self.namespace }
    pub fn name(&self) -> &str { self.name }
    pub fn user(&self) -> Option<&UserInfo> { self.user }
    pub fn is_dry_run(&self) -> bool { self.dry_run }

    pub fn object(&self) -> Option<&(dyn ApiObject + 'static)> { self.object.as_deref() }

    pub fn object_mut(&mut self) -> Option<&mut (dyn ApiObject + 'static)> {
        match &mut self.object {
            Some(obj) => Some(&mut **obj),
            None => None,
        }
    }

    pub fn old_object(&self) -> Option<&(dyn ApiObject + 'static)> { self.old }

    /// Candidate object downcast to its internal type.
    pub fn object_as<T: Kind>(&self) -> Option<&T> { self.object().and_then(|o| o.as_any().downcast_ref::<T>()) }

    pub fn object_as_mut<T: Kind>(&mut self) -> Option<&mut T> {
        self.object_mut().and_then(|o| o.as_any_mut().downcast_mut::<T>())
    }

    pub fn old_as<T: Kind>(&self) -> Option<&T> { self.old.and_then(|o| o.as_any().downcast_ref::<T>()) }
}
