//! Placeholder substitution.

use super::selector::SelectorError;
use super::Blueprint;
use crate::document::{Document, Mapping};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("missing input {0}")]
    Missing(String),
    #[error("unknown input {0}")]
    Unknown(String),
    #[error("invalid value for input {name}")]
    Invalid {
        name: String,
        #[source]
        source: SelectorError,
    },
}

impl Blueprint {
    /// Substitute `inputs` into the body.
    ///
    /// Checks run in order: every required input is supplied, no supplied
    /// input is undeclared, supplied values satisfy their selector. The body
    /// is then walked and every placeholder replaced by the bound value, or
    /// the input's default when the caller omitted it. Substituted values are
    /// copied as data and never evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`InputError`] on the first failing check.
    pub fn instantiate(&self, inputs: &Mapping) -> Result<Document, InputError> {
        if let Some(missing) = self
            .inputs()
            .iter()
            .find(|input| input.is_required() && !inputs.contains_key(&input.key))
        {
            return Err(InputError::Missing(missing.key.clone()));
        }

        if let Some(unknown) = inputs.keys().find(|key| self.input(key).is_none()) {
            return Err(InputError::Unknown(unknown.to_string()));
        }

        for (key, value) in inputs.iter() {
            if let Some(selector) = self.input(key).and_then(|input| input.selector.as_ref()) {
                selector.check(value).map_err(|source| InputError::Invalid {
                    name: key.to_string(),
                    source,
                })?;
            }
        }

        let body = Document::Mapping(self.body().clone());
        substitute(body, &|name| {
            inputs
                .get(name)
                .or_else(|| self.input(name).and_then(|input| input.default.as_ref()))
        })
    }
}

fn substitute<'a>(
    document: Document,
    lookup: &dyn Fn(&str) -> Option<&'a Document>,
) -> Result<Document, InputError> {
    match document {
        Document::Placeholder(name) => lookup(&name).cloned().ok_or(InputError::Missing(name)),
        Document::Sequence(items) => items
            .into_iter()
            .map(|item| substitute(item, lookup))
            .collect::<Result<_, _>>()
            .map(Document::Sequence),
        Document::Mapping(mapping) => mapping
            .into_iter()
            .map(|(key, value)| substitute(value, lookup).map(|value| (key, value)))
            .collect::<Result<Mapping, _>>()
            .map(Document::Mapping),
        plain @ (Document::Null | Document::Bool(_) | Document::Number(_) | Document::String(_)) => Ok(plain),
    }
}
