use std::borrow::{Borrow, Cow};
use std::fmt;

/// Identifier of a service registration.
///
/// Keys are plain strings. Use [`ServiceKey::of`] to derive one from a type
/// name when a service has a single obvious registration.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(Cow<'static, str>);

impl ServiceKey {
    /// Creates a key from a static string, usable in `const` items.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Creates a key from any string.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Creates a key from the fully qualified name of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(Cow::Borrowed(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ServiceKey {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ServiceKey {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl From<&ServiceKey> for ServiceKey {
    fn from(key: &ServiceKey) -> Self {
        key.clone()
    }
}

impl AsRef<str> for ServiceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ServiceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceKey({:?})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Marker;

    #[test]
    fn test_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ServiceKey::from("Logger"), 1);
        map.insert(ServiceKey::from(String::from("Service")), 2);

        assert_eq!(map.get("Logger"), Some(&1));
        assert_eq!(map.get("Service"), Some(&2));
        assert_eq!(map.get("Missing"), None);
    }

    #[test]
    fn test_key_of_type() {
        let key = ServiceKey::of::<Marker>();
        assert!(key.as_str().ends_with("Marker"));
        assert_eq!(key, ServiceKey::of::<Marker>());
    }
}
