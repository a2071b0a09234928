use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Formats an error together with its chain of sources.
pub struct ErrorFmt<E>(pub E);

impl<E: Error> Display for ErrorFmt<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut source = Some(&self.0 as &dyn Error);
        let mut sep = "";
        while let Some(e) = source {
            write!(f, "{}{}", sep, e)?;
            sep = ": ";
            source = e.source();
        }
        Ok(())
    }
}
