//! Job descriptor: the XML document that tells x2t what to convert.
//!
//! ```xml
//! <?xml version="1.0" encoding="utf-8"?>
//! <TaskQueueDataConvert xmlns:xsi="…" xmlns:xsd="…">
//!   <m_sFileFrom>/working/doc-1a2b/doc.docx</m_sFileFrom>
//!   <m_sThemeDir>/working/themes</m_sThemeDir>
//!   <m_sFileTo>/working/doc-1a2b/doc.bin</m_sFileTo>
//!   <m_bIsNoBase64>false</m_bIsNoBase64>
//!   <m_sFontDir>/working/fonts/</m_sFontDir>
//! </TaskQueueDataConvert>
//! ```
//!
//! Every interpolated value goes through [`escape_xml`]. File names are
//! additionally sanitised upstream by
//! [`crate::pipeline::workspace::sanitize_file_name`]; the two passes guard
//! different things and both always run.

use crate::error::X2tError;
use once_cell::sync::Lazy;
use regex::Regex;

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;
const ROOT_OPEN: &str = r#"<TaskQueueDataConvert xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#;
const ROOT_CLOSE: &str = "</TaskQueueDataConvert>";

static RE_DIRECTIVE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

static RE_ELEMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>([^<]*)</([A-Za-z_][A-Za-z0-9_]*)>").unwrap());

/// Replace the five XML metacharacters with their entities.
pub fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape_xml`].
pub fn unescape_xml(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

/// An extra `<name>value</name>` element in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    name: String,
    value: String,
}

impl Directive {
    /// Build a directive. The name must be a plain XML element name.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, X2tError> {
        let name = name.into();
        if !RE_DIRECTIVE_NAME.is_match(&name) {
            return Err(X2tError::InvalidDirective { name });
        }
        Ok(Self {
            name,
            value: value.into(),
        })
    }

    /// `m_sFontDir`: where fixed-layout exports find fonts. Always ends in `/`.
    pub fn font_dir(dir: &str) -> Self {
        Self {
            name: "m_sFontDir".to_string(),
            value: format!("{}/", dir.trim_end_matches('/')),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// A conversion job for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub file_from: String,
    pub file_to: String,
    pub theme_dir: String,
    pub no_base64: bool,
    pub directives: Vec<Directive>,
}

impl JobDescriptor {
    pub fn new(
        file_from: impl Into<String>,
        file_to: impl Into<String>,
        theme_dir: impl Into<String>,
    ) -> Self {
        Self {
            file_from: file_from.into(),
            file_to: file_to.into(),
            theme_dir: theme_dir.into(),
            no_base64: false,
            directives: Vec::new(),
        }
    }

    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Render the descriptor text.
    pub fn render(&self) -> String {
        let mut xml = String::with_capacity(512);
        xml.push_str(XML_HEADER);
        xml.push('\n');
        xml.push_str(ROOT_OPEN);
        xml.push('\n');
        push_element(&mut xml, "m_sFileFrom", &self.file_from);
        push_element(&mut xml, "m_sThemeDir", &self.theme_dir);
        push_element(&mut xml, "m_sFileTo", &self.file_to);
        push_element(
            &mut xml,
            "m_bIsNoBase64",
            if self.no_base64 { "true" } else { "false" },
        );
        for d in &self.directives {
            push_element(&mut xml, &d.name, &d.value);
        }
        xml.push_str(ROOT_CLOSE);
        xml
    }

    /// Read a rendered descriptor back. Returns `None` if either file path
    /// is missing. Unknown elements become directives.
    pub fn parse(xml: &str) -> Option<Self> {
        let mut file_from = None;
        let mut file_to = None;
        let mut theme_dir = String::new();
        let mut no_base64 = false;
        let mut directives = Vec::new();

        for caps in RE_ELEMENT.captures_iter(xml) {
            if caps[1] != caps[3] {
                continue;
            }
            let value = unescape_xml(&caps[2]);
            match &caps[1] {
                "m_sFileFrom" => file_from = Some(value),
                "m_sFileTo" => file_to = Some(value),
                "m_sThemeDir" => theme_dir = value,
                "m_bIsNoBase64" => no_base64 = value == "true",
                other => directives.push(Directive {
                    name: other.to_string(),
                    value,
                }),
            }
        }

        Some(Self {
            file_from: file_from?,
            file_to: file_to?,
            theme_dir,
            no_base64,
            directives,
        })
    }
}

fn push_element(xml: &mut String, name: &str, value: &str) {
    xml.push_str("  <");
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape_xml(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}
