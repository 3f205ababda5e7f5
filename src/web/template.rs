//! HTML page rendering for the form server.

use minijinja::Environment;
use serde::Serialize;

use crate::error::Result;

const INDEX_TEMPLATE: &str = "index.html";

/// Values the upload page can display.
#[derive(Debug, Default, Serialize)]
pub struct PageContext {
    pub prediction_text: Option<String>,
    pub image_name: Option<String>,
    pub percentage: Option<f64>,
}

impl PageContext {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            prediction_text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Compiled page templates. `.html` templates are auto-escaped.
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    /// Compile the bundled templates.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to parse.
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(INDEX_TEMPLATE, include_str!("../../templates/index.html"))?;
        Ok(Self { env })
    }

    /// Render the upload page.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_index(&self, ctx: &PageContext) -> Result<String> {
        Ok(self.env.get_template(INDEX_TEMPLATE)?.render(ctx)?)
    }
}
