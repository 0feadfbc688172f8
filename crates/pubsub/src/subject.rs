use crate::broker::BrokerError;
use crate::error::Error;

/// Returns the name of the stream a subject belongs to: the text before the
/// first `.`.
///
/// # Errors
///
/// Returns [`Error::InvalidSubject`] if the first token is empty or contains a
/// wildcard.
pub fn stream_name<E>(subject: &str) -> Result<&str, Error<E>>
where
    E: BrokerError,
{
    let name = subject.split('.').next().unwrap_or_default();

    if name.is_empty() || name.contains(['*', '>']) || name.contains(char::is_whitespace) {
        return Err(Error::InvalidSubject(subject.to_string()));
    }

    Ok(name)
}

/// Checks whether a concrete subject matches a filter. `*` matches exactly one
/// token and a trailing `>` matches one or more tokens.
#[must_use]
pub fn matches_filter(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return filter_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(f), Some(s)) if f == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// The default subject filter covering every subject of a stream.
#[must_use]
pub fn all_in_stream(stream_name: &str) -> String {
    format!("{stream_name}.>")
}
