use handlebars::Handlebars;
use include_dir::{include_dir, Dir};
use serde::Serialize;
use valor_domain::{Error, Result};

static TEMPLATES: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/../../templates");

pub const TEST_LIST_GENERATION: &str = "test_list_generation";
pub const SINGLE_TEST_GENERATION: &str = "single_test_generation";

/// Variables of the `single_test_generation` template. Paths point into the
/// execution environment's working directory; absent artifacts substitute as
/// empty strings.
#[derive(Debug, Clone, Serialize)]
pub struct SingleTestVars {
    pub documentation: String,
    pub code: String,
    pub train_path: String,
    pub test_path: String,
    pub model_path: String,
    pub output_folder: String,
    pub test_title: String,
    pub test_description: String,
}

/// Variables of the `test_list_generation` template.
#[derive(Debug, Clone, Serialize)]
pub struct TestListVars {
    pub documentation: String,
    pub code: String,
}

/// Prompt template engine. Templates are embedded from the repository's
/// `templates/` folder and rendered with handlebars in strict mode, so a
/// missing substitution key fails instead of rendering a hole. Follow-up
/// prompts never go through here — they are appended to the conversation as
/// raw user messages.
pub struct PromptTemplates {
    hb: Handlebars<'static>,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptTemplates {
    pub fn new() -> Self {
        let mut hb = Handlebars::new();
        hb.set_strict_mode(true);
        hb.register_escape_fn(|value| value.to_string());

        for file in TEMPLATES.files() {
            let name = file
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .expect("embedded template has a utf-8 name");
            let contents = file
                .contents_utf8()
                .expect("embedded template is valid utf-8");
            hb.register_template_string(name, contents)
                .expect("embedded template parses");
        }

        Self { hb }
    }

    pub fn render(&self, name: &str, data: &impl Serialize) -> Result<String> {
        if !self.hb.has_template(name) {
            return Err(Error::TemplateNotFound(name.to_string()));
        }

        // Strict mode: the only render failure our plain substitution
        // templates can produce is a missing variable.
        self.hb
            .render(name, data)
            .map_err(|error| Error::MissingVariable(error.to_string()))
    }
}
