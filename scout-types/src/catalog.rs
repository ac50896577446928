//! Model catalog and the provider/model selection it constrains.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SelectionError;
use crate::types::Provider;

/// Mapping from provider identifier to its ordered list of model names.
///
/// Fetched once per session and read-only afterwards. Keys the client does
/// not know as a [`Provider`] are kept but are not selectable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelCatalog {
    providers: BTreeMap<String, Vec<String>>,
}

impl ModelCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model list for a provider.
    #[must_use]
    pub fn with_models<I, S>(mut self, provider: Provider, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers.insert(
            provider.as_str().to_string(),
            models.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Models advertised for `provider`, in server order. Empty when absent.
    #[must_use]
    pub fn models(&self, provider: Provider) -> &[String] {
        self.providers
            .get(provider.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The first advertised model for `provider`, if any.
    #[must_use]
    pub fn first_model(&self, provider: Provider) -> Option<&str> {
        self.models(provider).first().map(String::as_str)
    }

    /// Whether `model` is advertised for `provider`.
    #[must_use]
    pub fn contains(&self, provider: Provider, model: &str) -> bool {
        self.models(provider).iter().any(|m| m == model)
    }

    /// All catalog entries, including providers unknown to the client.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.providers
            .iter()
            .map(|(provider, models)| (provider.as_str(), models.as_slice()))
    }

    /// Whether the catalog has no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// The user's current provider and model choice.
///
/// The model is always either unset or a member of the catalog list of the
/// selected provider; every mutation goes through the catalog to keep it so.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSelection {
    provider: Provider,
    model: Option<String>,
}

impl ModelSelection {
    /// Start with `provider` selected and no model.
    #[must_use]
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            model: None,
        }
    }

    /// The selected provider.
    #[must_use]
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// The selected model, if any.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Switch provider and reset the model to the provider's first catalog
    /// entry, or unset it when the provider has none.
    pub fn select_provider(&mut self, provider: Provider, catalog: &ModelCatalog) {
        self.provider = provider;
        self.model = catalog.first_model(provider).map(str::to_string);
    }

    /// Select a model of the current provider.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::UnknownModel`] when the model is not
    /// advertised for the current provider; the selection is left unchanged.
    pub fn select_model(
        &mut self,
        model: &str,
        catalog: &ModelCatalog,
    ) -> Result<(), SelectionError> {
        if !catalog.contains(self.provider, model) {
            return Err(SelectionError::UnknownModel {
                provider: self.provider.to_string(),
                model: model.to_string(),
            });
        }
        self.model = Some(model.to_string());
        Ok(())
    }

    /// Re-validate against a freshly loaded catalog: keep the model when it is
    /// still advertised, otherwise fall back to the provider's first model.
    pub fn reconcile(&mut self, catalog: &ModelCatalog) {
        let still_valid = self
            .model
            .as_deref()
            .is_some_and(|m| catalog.contains(self.provider, m));
        if !still_valid {
            self.model = catalog.first_model(self.provider).map(str::to_string);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> ModelCatalog {
        ModelCatalog::new()
            .with_models(Provider::DeepSeek, ["deepseek-chat", "deepseek-coder"])
            .with_models(Provider::Ollama, Vec::<String>::new())
            .with_models(Provider::Groq, ["mixtral-8x7b-32768"])
    }

    #[test]
    fn provider_change_selects_first_model() {
        let catalog = catalog();
        let mut sel = ModelSelection::new(Provider::DeepSeek);
        sel.select_provider(Provider::Groq, &catalog);
        assert_eq!(sel.provider(), Provider::Groq);
        assert_eq!(sel.model(), Some("mixtral-8x7b-32768"));
    }

    #[test]
    fn provider_change_clears_model_when_list_empty() {
        let catalog = catalog();
        let mut sel = ModelSelection::new(Provider::DeepSeek);
        sel.select_provider(Provider::DeepSeek, &catalog);
        assert_eq!(sel.model(), Some("deepseek-chat"));
        sel.select_provider(Provider::Ollama, &catalog);
        assert_eq!(sel.model(), None);
    }

    #[test]
    fn provider_absent_from_catalog_clears_model() {
        let catalog = ModelCatalog::new().with_models(Provider::DeepSeek, ["deepseek-chat"]);
        let mut sel = ModelSelection::new(Provider::DeepSeek);
        sel.reconcile(&catalog);
        sel.select_provider(Provider::Groq, &catalog);
        assert_eq!(sel.model(), None);
    }

    #[test]
    fn select_model_rejects_foreign_model() {
        let catalog = catalog();
        let mut sel = ModelSelection::new(Provider::DeepSeek);
        sel.select_provider(Provider::DeepSeek, &catalog);
        let err = sel.select_model("mixtral-8x7b-32768", &catalog).unwrap_err();
        assert_eq!(
            err,
            SelectionError::UnknownModel {
                provider: "deepseek".into(),
                model: "mixtral-8x7b-32768".into(),
            }
        );
        assert_eq!(sel.model(), Some("deepseek-chat"));

        sel.select_model("deepseek-coder", &catalog).unwrap();
        assert_eq!(sel.model(), Some("deepseek-coder"));
    }

    #[test]
    fn reconcile_keeps_valid_model() {
        let catalog = catalog();
        let mut sel = ModelSelection::new(Provider::DeepSeek);
        sel.select_provider(Provider::DeepSeek, &catalog);
        sel.select_model("deepseek-coder", &catalog).unwrap();
        sel.reconcile(&catalog);
        assert_eq!(sel.model(), Some("deepseek-coder"));

        let shrunk = ModelCatalog::new().with_models(Provider::DeepSeek, ["deepseek-chat"]);
        sel.reconcile(&shrunk);
        assert_eq!(sel.model(), Some("deepseek-chat"));
    }

    #[test]
    fn catalog_deserializes_from_server_mapping() {
        let catalog: ModelCatalog = serde_json::from_str(
            r#"{"deepseek":["deepseek-chat"],"ollama":["llama2","mistral"],"openai":["gpt-4o"]}"#,
        )
        .unwrap();
        assert_eq!(catalog.models(Provider::Ollama), ["llama2", "mistral"]);
        assert!(catalog.models(Provider::Groq).is_empty());
        assert_eq!(catalog.entries().count(), 3);
    }
}
