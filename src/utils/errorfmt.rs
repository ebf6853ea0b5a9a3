use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Formats an error followed by all of its sources.
pub struct ErrorFmt<E>(pub E);

impl<E: Error> Display for ErrorFmt<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(e) = source {
            write!(f, ": {}", e)?;
            source = e.source();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {crate::utils::errorfmt::ErrorFmt, thiserror::Error};

    #[derive(Debug, Error)]
    #[error("inner")]
    struct Inner;

    #[derive(Debug, Error)]
    #[error("outer")]
    struct Outer(#[source] Inner);

    #[test]
    fn chain() {
        assert_eq!(ErrorFmt(Outer(Inner)).to_string(), "outer: inner");
        assert_eq!(ErrorFmt(Inner).to_string(), "inner");
    }
}
