//! Page rendering
//!
//! Pages are compiled into the binary and registered with a strict-mode
//! handlebars registry: a placeholder without a value is a render error, and
//! every substituted value is HTML-escaped.

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

/// Name of the consent page template.
pub const GLASS_PAGE: &str = "glass";

/// Renders the service's named pages.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Renderer with the built-in pages.
    pub fn new() -> Result<Self, TemplateError> {
        Self::from_sources(&[(GLASS_PAGE, include_str!("../templates/glass.html"))])
    }

    /// Renderer over an explicit `(name, source)` template set.
    pub fn from_sources(sources: &[(&str, &str)]) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        for (name, source) in sources {
            registry.register_template_string(name, source)?;
        }
        Ok(Self { registry })
    }

    /// Render `name` with values taken from `context`.
    pub fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, RenderError> {
        self.registry.render(name, context)
    }
}
