use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(String),
    Int(i64),
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart::Str(value.to_string())
    }
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        KeyPart::Int(value)
    }
}

/// Ordered tuple naming a logical query, e.g. `(todos, "owner", 3)`.
/// Keys that share a prefix form a family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

const TODOS: &str = "todos";
const OWNER: &str = "owner";

impl QueryKey {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        QueryKey(parts)
    }

    /// `(todos,)`, the full list.
    pub fn todos() -> Self {
        QueryKey(vec![TODOS.into()])
    }

    /// `(todos, id)`
    pub fn todo(id: i64) -> Self {
        QueryKey(vec![TODOS.into(), id.into()])
    }

    /// `(todos, "owner", owner_id)`
    pub fn todos_by_owner(owner_id: i64) -> Self {
        QueryKey(vec![TODOS.into(), OWNER.into(), owner_id.into()])
    }

    /// `(todos, "owner")`, the prefix of every owner-scoped list.
    pub fn owner_family() -> Self {
        QueryKey(vec![TODOS.into(), OWNER.into()])
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match part {
                KeyPart::Str(s) => write!(f, "{:?}", s)?,
                KeyPart::Int(n) => write!(f, "{}", n)?,
            }
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_families() {
        let all = QueryKey::todos();
        assert!(QueryKey::todo(4).starts_with(&all));
        assert!(QueryKey::todos_by_owner(3).starts_with(&QueryKey::owner_family()));
        assert!(!QueryKey::todo(4).starts_with(&QueryKey::owner_family()));
        assert!(!QueryKey::todos_by_owner(3).starts_with(&QueryKey::todos_by_owner(31)));
        assert!(all.starts_with(&all));
    }

    #[test]
    fn test_string_and_int_parts_differ() {
        let by_str = QueryKey::new(vec!["todos".into(), KeyPart::Str("1".to_string())]);
        assert_ne!(by_str, QueryKey::todo(1));
        assert_eq!(QueryKey::todos_by_owner(2).to_string(), "(\"todos\", \"owner\", 2)");
    }
}
