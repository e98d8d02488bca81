use std::fmt;

use crate::bytes::OutOfBounds;

/// Early-return with a [`DexError`], with optional format arguments.
#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err($crate::dex::error::DexError::new($msg))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err($crate::dex::error::DexError::new(&format!($fmtstr, $($args)*)))
    };
}

#[derive(Debug, PartialEq, Eq)]
pub struct DexError {
    msg: String,
    contexts: Vec<String>,
}

impl DexError {
    pub fn new(msg: &str) -> Self {
        DexError {
            msg: msg.to_string(),
            contexts: Vec::new(),
        }
    }

    pub fn with_context(base: DexError, context: String) -> Self {
        let mut contexts = base.contexts;
        contexts.push(context);
        DexError {
            msg: base.msg,
            contexts,
        }
    }
}

impl fmt::Display for DexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}

impl From<OutOfBounds> for DexError {
    fn from(value: OutOfBounds) -> Self {
        DexError::new(&value.to_string())
    }
}
