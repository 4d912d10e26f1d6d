pub trait ResultExt<T, E> {
    /// Converts a non-fatal error into `None`, logging it as a warning with `context`.
    fn ok_or_log(self, context: &str) -> Option<T>;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_or_log(self, context: &str) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{context}: {err}");
                None
            }
        }
    }
}
