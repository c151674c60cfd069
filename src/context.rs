use std::collections::HashMap;

use crate::marker::TypeTag;

/// Resolves user type names to the type ids used on the wire, and back.
///
/// Trees don't need a context to parse or produce deltas: user type ids are carried in the data
/// itself. The context is consulted when a caller asks for a value *as* some named type, or
/// writes a named type into the tree.
#[derive(Clone, Debug, Default)]
pub struct TypeContext {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user type under the given wire id. A later registration of the same name or id
    /// replaces the earlier one.
    pub fn with_type(mut self, name: impl Into<String>, id: u32) -> Self {
        self.insert(name, id);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, id: u32) {
        let name = name.into();
        if let Some(old_id) = self.by_name.remove(&name) {
            self.by_id.remove(&old_id);
        }
        if let Some(old_name) = self.by_id.remove(&id) {
            self.by_name.remove(&old_name);
        }
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name);
    }

    /// Get the composite type tag for a named user type.
    pub fn tag_of(&self, name: &str) -> Option<TypeTag> {
        self.by_name.get(name).map(|id| TypeTag::UserType(*id))
    }

    /// Get the name of a user type tag.
    pub fn name_of(&self, tag: TypeTag) -> Option<&str> {
        match tag {
            TypeTag::UserType(id) => self.by_id.get(&id).map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lookup_both_ways() {
        let ctx = TypeContext::new().with_type("Customer", 4).with_type("Order", 5);
        assert_eq!(ctx.tag_of("Customer"), Some(TypeTag::UserType(4)));
        assert_eq!(ctx.name_of(TypeTag::UserType(5)), Some("Order"));
        assert_eq!(ctx.tag_of("Invoice"), None);
        assert_eq!(ctx.name_of(TypeTag::I32), None);
    }

    #[test]
    fn replace() {
        let ctx = TypeContext::new().with_type("Customer", 4).with_type("Customer", 6);
        assert_eq!(ctx.tag_of("Customer"), Some(TypeTag::UserType(6)));
        assert_eq!(ctx.name_of(TypeTag::UserType(4)), None);

        let ctx = TypeContext::new().with_type("Customer", 4).with_type("Client", 4);
        assert_eq!(ctx.name_of(TypeTag::UserType(4)), Some("Client"));
        assert_eq!(ctx.tag_of("Customer"), None);
    }
}
