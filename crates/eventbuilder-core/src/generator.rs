//! The end-to-end pipeline: modules → model → text.

use crate::error::Result;
use crate::extract::{DelegateExtractor, EventExtractor, EventScope, ExtractOptions, TypeSystem};
use crate::loader::ModuleSet;
use crate::model::{Aggregator, Diagnostic, TemplateModel};
use crate::platform::PlatformDescriptor;
use crate::render::{MustacheRenderer, Substitutions, TemplateRenderer, TemplateSource};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Configuration for a [`Generator`]
#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Which events to extract
    pub event_scope: EventScope,
    /// Namespaces whose types are skipped
    pub excluded_namespaces: Vec<String>,
    /// Replacements applied to rendered text
    pub substitutions: Substitutions,
    /// Template to render
    pub template: TemplateSource,
}

impl GeneratorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Config matching a platform's scope, exclusions and template
    pub fn for_platform(descriptor: &PlatformDescriptor) -> Self {
        Self::new()
            .event_scope(descriptor.event_scope)
            .excluded_namespaces(descriptor.excluded_namespaces.clone())
            .template(TemplateSource::Builtin(descriptor.template))
    }

    /// Sets the event scope
    pub fn event_scope(mut self, scope: EventScope) -> Self {
        self.event_scope = scope;
        self
    }

    /// Replaces the excluded namespaces
    pub fn excluded_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.excluded_namespaces = namespaces;
        self
    }

    /// Sets the substitution table
    pub fn substitutions(mut self, substitutions: Substitutions) -> Self {
        self.substitutions = substitutions;
        self
    }

    /// Sets the template
    pub fn template(mut self, template: TemplateSource) -> Self {
        self.template = template;
        self
    }
}

/// Output of one run
#[derive(Debug)]
pub struct Generated {
    /// Rendered and substituted text
    pub text: String,
    /// Model the text was rendered from
    pub model: TemplateModel,
    /// Members skipped along the way
    pub diagnostics: Vec<Diagnostic>,
}

/// Runs extraction, aggregation and rendering
#[derive(Debug)]
pub struct Generator<R = MustacheRenderer> {
    config: GeneratorConfig,
    renderer: R,
}

impl Generator<MustacheRenderer> {
    /// Creates a generator using the bundled renderer
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            config,
            renderer: MustacheRenderer,
        }
    }
}

impl<R: TemplateRenderer> Generator<R> {
    /// Swaps the template renderer
    pub fn with_renderer<S: TemplateRenderer>(self, renderer: S) -> Generator<S> {
        Generator {
            config: self.config,
            renderer,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Builds the model from every root module of `types`
    pub fn extract<T: TypeSystem + ?Sized>(&self, types: &T) -> Result<(TemplateModel, Vec<Diagnostic>)> {
        let options = ExtractOptions {
            excluded_namespaces: self.config.excluded_namespaces.clone(),
            scope: self.config.event_scope,
        };
        let events = EventExtractor::new(types, &options).extract()?;
        let delegates = DelegateExtractor::new(types, &options).extract()?;

        let mut aggregator = Aggregator::new();
        for details in events.types.into_iter().chain(delegates.types) {
            aggregator.add_type_details(details);
        }
        aggregator.add_events(events.signatures);
        aggregator.add_delegates(delegates.signatures);
        let model = aggregator.finish();

        let mut diagnostics = events.diagnostics;
        diagnostics.extend(delegates.diagnostics);
        debug!(
            "Model has {} namespace(s), {} delegate namespace(s), {} member(s)",
            model.namespaces.len(),
            model.delegate_namespaces.len(),
            model.member_count()
        );
        Ok((model, diagnostics))
    }

    /// Renders the model with the configured template and substitutions
    pub fn render(&self, model: &TemplateModel) -> Result<String> {
        let template = self.config.template.load()?;
        let text = self.renderer.render(&template, model)?;
        Ok(self.config.substitutions.apply(&text))
    }

    /// Extracts and renders from an already loaded type system
    pub fn generate_from<T: TypeSystem + ?Sized>(&self, types: &T) -> Result<Generated> {
        let (model, diagnostics) = self.extract(types)?;
        if !diagnostics.is_empty() {
            warn!("Skipped {} member(s) with unrecognized signatures", diagnostics.len());
        }
        let text = self.render(&model)?;
        Ok(Generated {
            text,
            model,
            diagnostics,
        })
    }

    /// Loads `roots` (resolving dependencies in `search_dirs`) and generates
    pub fn generate(&self, roots: &[PathBuf], search_dirs: &[PathBuf]) -> Result<Generated> {
        let modules = ModuleSet::load(roots, search_dirs)?;
        self.generate_from(&modules)
    }
}
