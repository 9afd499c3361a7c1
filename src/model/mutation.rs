use std::fmt;

/// What the synchronization engine should do with the remote check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutation {
    CreateOrUpdate,
    Delete,
}

impl Mutation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mutation::CreateOrUpdate => "create-or-update",
            Mutation::Delete => "delete",
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
