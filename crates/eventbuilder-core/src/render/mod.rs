//! Rendering the template model to text.
//!
//! The [`TemplateRenderer`] trait is the seam between the model and any
//! templating engine. [`MustacheRenderer`] is the bundled implementation; its
//! output is usually passed through [`Substitutions`] afterwards.

mod mustache;
mod substitutions;

pub use mustache::Template;
pub use substitutions::Substitutions;

use crate::error::{Error, Result};
use crate::model::TemplateModel;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Renders a template against the model
pub trait TemplateRenderer {
    /// Renders `template` with `model` as its root context
    fn render(&self, template: &str, model: &TemplateModel) -> Result<String>;
}

/// Mustache-subset renderer over the serialized model
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheRenderer;

impl TemplateRenderer for MustacheRenderer {
    fn render(&self, template: &str, model: &TemplateModel) -> Result<String> {
        let data = serde_json::to_value(model)?;
        let compiled = Template::compile(template)?;
        let out = compiled.render(&data);
        debug!("Rendered {} byte(s)", out.len());
        Ok(out)
    }
}

/// Templates shipped with the crate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuiltinTemplate {
    /// Instance events and delegates
    #[default]
    Default,
    /// Static events
    Essentials,
}

impl BuiltinTemplate {
    /// Template text
    pub fn source(&self) -> &'static str {
        match self {
            BuiltinTemplate::Default => include_str!("../../templates/default.mustache"),
            BuiltinTemplate::Essentials => include_str!("../../templates/essentials.mustache"),
        }
    }
}

/// Where the template text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// A template shipped with the crate
    Builtin(BuiltinTemplate),
    /// A template file
    File(PathBuf),
    /// Template text held in memory
    Inline(String),
}

impl Default for TemplateSource {
    fn default() -> Self {
        TemplateSource::Builtin(BuiltinTemplate::Default)
    }
}

impl TemplateSource {
    /// Template file on disk
    pub fn file(path: impl AsRef<Path>) -> Self {
        TemplateSource::File(path.as_ref().to_path_buf())
    }

    /// Loads the template text
    pub fn load(&self) -> Result<String> {
        match self {
            TemplateSource::Builtin(builtin) => Ok(builtin.source().to_string()),
            TemplateSource::File(path) => {
                std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))
            }
            TemplateSource::Inline(text) => Ok(text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NamespaceGroup, NormalizedSignature, PayloadParam, TypeGroup, TypeName};
    use pretty_assertions::assert_eq;

    fn model() -> TemplateModel {
        TemplateModel {
            namespaces: vec![NamespaceGroup {
                name: "Acme".into(),
                types: vec![TypeGroup {
                    name: "Widget".into(),
                    full_name: "Acme.Widget".into(),
                    parent: None,
                    is_static: false,
                    is_abstract: false,
                    members: vec![
                        NormalizedSignature::new("Acme", "Widget", "Clicked", vec![])
                            .handler_type("System.EventHandler")
                            .handler_parameters(vec![
                                PayloadParam::new("sender", "System.Object"),
                                PayloadParam::new("e", "System.EventArgs"),
                            ]),
                        NormalizedSignature::new(
                            "Acme",
                            "Widget",
                            "ValueChanged",
                            vec![PayloadParam::new("value", "System.Int32")],
                        )
                        .handler_type("Acme.ValueHandler"),
                    ],
                }],
            }],
            delegate_namespaces: vec![],
        }
    }

    #[test]
    fn test_render_model() {
        let template = "{{#namespaces}}{{name}}:\n{{#types}}{{#members}}  {{declaringType}}.{{name}} -> {{{payloadType}}}\n{{/members}}{{/types}}{{/namespaces}}";
        let out = MustacheRenderer.render(template, &model()).unwrap();
        assert_eq!(
            out,
            "Acme:\n  Widget.Clicked -> System.Reactive.Unit\n  Widget.ValueChanged -> System.Int32\n"
        );
    }

    #[test]
    fn test_builtin_templates_render() {
        for builtin in [BuiltinTemplate::Default, BuiltinTemplate::Essentials] {
            let out = MustacheRenderer.render(builtin.source(), &model()).unwrap();
            assert!(out.contains("ValueChanged"), "{:?}: {}", builtin, out);
        }
        let out = MustacheRenderer
            .render(BuiltinTemplate::Default.source(), &TemplateModel::default())
            .unwrap();
        assert!(!out.contains("namespace "));
    }

    fn button() -> TypeGroup {
        TypeGroup {
            name: "Button".into(),
            full_name: "Acme.Button".into(),
            parent: Some(TypeName::new("Acme", "Widget")),
            is_static: false,
            is_abstract: false,
            members: vec![NormalizedSignature::new("Acme", "Button", "Pressed", vec![])
                .handler_type("System.EventHandler")],
        }
    }

    #[test]
    fn test_default_template_derives_parent_wrapper() {
        let mut model = model();
        model.namespaces[0].types.insert(0, button());
        let out = MustacheRenderer
            .render(BuiltinTemplate::Default.source(), &model)
            .unwrap();
        assert!(
            out.contains("public class RxButtonEvents : global::Acme.RxWidgetEvents"),
            "{}",
            out
        );
        assert!(out.contains("public RxButtonEvents(global::Acme.Button data) : base(data)"));
        assert!(out.contains("public class RxWidgetEvents\n"));
    }

    #[test]
    fn test_handlers_take_full_invoke_parameters() {
        for builtin in [BuiltinTemplate::Default, BuiltinTemplate::Essentials] {
            let out = MustacheRenderer.render(builtin.source(), &model()).unwrap();
            assert!(
                out.contains("void Handler(System.Object sender, System.EventArgs e) => eventHandler(Unit.Default);"),
                "{:?}: {}",
                builtin,
                out
            );
            assert!(
                out.contains("void Handler(System.Int32 value) => eventHandler(value);"),
                "{:?}: {}",
                builtin,
                out
            );
            assert!(!out.contains("object sender"));
        }
    }

    #[test]
    fn test_template_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.mustache");
        std::fs::write(&path, "{{#namespaces}}{{name}}{{/namespaces}}").unwrap();

        assert_eq!(TemplateSource::file(&path).load().unwrap(), "{{#namespaces}}{{name}}{{/namespaces}}");
        assert_eq!(TemplateSource::Inline("x".into()).load().unwrap(), "x");
        assert!(matches!(
            TemplateSource::file(dir.path().join("absent")).load(),
            Err(Error::FileRead { .. })
        ));
    }
}
