use regex::Regex;

use crate::container::ContainerMeta;

use super::Result;

/// Selects the containers to attach by name and image.
///
/// A container is admitted if it matches every configured `match_by_*` pattern and none
/// of the `skip_by_*` patterns. Without patterns every container is admitted.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    match_by_name: Option<Regex>,
    match_by_image: Option<Regex>,
    skip_by_name: Option<Regex>,
    skip_by_image: Option<Regex>,
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    Ok(pattern.map(Regex::new).transpose()?)
}

impl ContainerFilter {
    /// Admits only containers whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Fails if `pattern` is not a valid regular expression.
    pub fn match_by_name(mut self, pattern: Option<&str>) -> Result<Self> {
        self.match_by_name = compile(pattern)?;
        Ok(self)
    }

    /// Admits only containers whose image matches `pattern`.
    pub fn match_by_image(mut self, pattern: Option<&str>) -> Result<Self> {
        self.match_by_image = compile(pattern)?;
        Ok(self)
    }

    /// Ignores containers whose name matches `pattern`.
    pub fn skip_by_name(mut self, pattern: Option<&str>) -> Result<Self> {
        self.skip_by_name = compile(pattern)?;
        Ok(self)
    }

    /// Ignores containers whose image matches `pattern`.
    pub fn skip_by_image(mut self, pattern: Option<&str>) -> Result<Self> {
        self.skip_by_image = compile(pattern)?;
        Ok(self)
    }

    pub fn admits(&self, meta: &ContainerMeta) -> bool {
        let matches = |re: &Option<Regex>, value: &str| re.as_ref().map(|re| re.is_match(value));

        matches(&self.match_by_name, &meta.name).unwrap_or(true)
            && matches(&self.match_by_image, &meta.image).unwrap_or(true)
            && !matches(&self.skip_by_name, &meta.name).unwrap_or(false)
            && !matches(&self.skip_by_image, &meta.image).unwrap_or(false)
    }
}
