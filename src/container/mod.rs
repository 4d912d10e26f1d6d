use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Number of leading characters of a container id reported in metric records.
pub const SHORT_ID_LEN: usize = 12;

/// A validated container identifier.
///
/// # Examples
///
/// ```
/// # use dockstat::container::ContainerID;
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.short(), "abc123abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first [`SHORT_ID_LEN`] characters of the id, or the whole id if it is
    /// shorter.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }

    /// Returns `true` if this id denotes the collector itself, i.e. it begins with the given
    /// identity. An empty identity never matches.
    pub fn is_self(&self, identity: &str) -> bool {
        !identity.is_empty() && self.0.starts_with(identity)
    }
}

impl FromStr for ContainerID {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity and descriptive metadata of a running container, as reported by the
/// lifecycle source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMeta {
    pub id: ContainerID,
    pub image: String,
    pub name: String,
}

impl ContainerMeta {
    pub fn new(id: ContainerID, image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            image: image.into(),
            name: name.into(),
        }
    }
}
