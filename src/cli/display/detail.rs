//! Key-value detail views.

use console::style;

use super::colors::label;

pub struct DetailView {
    title: String,
    sections: Vec<DetailSection>,
}

struct DetailSection {
    header: Option<String>,
    fields: Vec<(String, String)>,
    items: Vec<String>,
}

impl DetailView {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sections: vec![DetailSection { header: None, fields: vec![], items: vec![] }],
        }
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: impl ToString) -> Self {
        if let Some(section) = self.sections.last_mut() {
            section.fields.push((key.to_string(), value.to_string()));
        }
        self
    }

    #[must_use]
    pub fn field_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    #[must_use]
    pub fn section(mut self, header: &str) -> Self {
        self.sections.push(DetailSection { header: Some(header.to_string()), fields: vec![], items: vec![] });
        self
    }

    #[must_use]
    pub fn item(mut self, text: impl ToString) -> Self {
        if let Some(section) = self.sections.last_mut() {
            section.items.push(text.to_string());
        }
        self
    }

    #[must_use]
    pub fn items<I, T>(self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        items.into_iter().fold(self, |view, item| view.item(item))
    }

    pub fn render(&self) -> String {
        let mut lines = vec![style(&self.title).bold().to_string()];
        let key_width = self.sections.iter().flat_map(|s| s.fields.iter()).map(|(k, _)| k.len()).max().unwrap_or(12);

        for section in &self.sections {
            if section.header.is_some() && section.fields.is_empty() && section.items.is_empty() {
                continue;
            }
            if let Some(header) = &section.header {
                lines.push(String::new());
                lines.push(style(header).bold().underlined().to_string());
            }
            for (key, value) in &section.fields {
                let padding = " ".repeat(key_width.saturating_sub(key.len()));
                lines.push(format!("  {}{}  {}", label(key), padding, value));
            }
            for item in &section.items {
                lines.push(format!("  {} {}", style("\u{2022}").dim(), item));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sections_are_skipped() {
        console::set_colors_enabled(false);
        let view = DetailView::new("Trigger")
            .field("Status", "reported")
            .field_opt("Company", None::<String>)
            .section("Red Flags")
            .section("Findings")
            .items(["orders up"]);
        let rendered = view.render();
        assert!(rendered.contains("Status:"));
        assert!(!rendered.contains("Company"));
        assert!(!rendered.contains("Red Flags"));
        assert!(rendered.contains("• orders up"));
    }
}
