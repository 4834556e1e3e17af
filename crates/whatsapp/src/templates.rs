use serde::Serialize;
use tera::{Context, Tera};

use concierge_core::domain::conversation::PendingActionKind;
use concierge_core::{Language, MessagingError};

const TEMPLATES: &[(&str, &str)] = &[
    ("pictures.en.txt", include_str!("../../../templates/outreach/pictures.en.txt")),
    ("pictures.tr.txt", include_str!("../../../templates/outreach/pictures.tr.txt")),
    ("pictures.ru.txt", include_str!("../../../templates/outreach/pictures.ru.txt")),
    ("pictures.de.txt", include_str!("../../../templates/outreach/pictures.de.txt")),
    ("availability.en.txt", include_str!("../../../templates/outreach/availability.en.txt")),
    ("availability.tr.txt", include_str!("../../../templates/outreach/availability.tr.txt")),
    ("availability.ru.txt", include_str!("../../../templates/outreach/availability.ru.txt")),
    ("availability.de.txt", include_str!("../../../templates/outreach/availability.de.txt")),
];

/// Values interpolated into an outreach message.
#[derive(Clone, Debug, Serialize)]
pub struct OutreachTemplateContext {
    pub listing_id: i64,
    pub listing_title: String,
    pub location: Option<String>,
}

/// Multilingual text sent to a listing's agent when the user asks us to reach out.
pub struct OutreachTemplates {
    tera: Tera,
}

impl OutreachTemplates {
    pub fn new() -> Result<Self, MessagingError> {
        let mut tera = Tera::default();
        tera.add_raw_templates(TEMPLATES.iter().copied())
            .map_err(|e| MessagingError::Template(e.to_string()))?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        kind: PendingActionKind,
        language: Language,
        values: &OutreachTemplateContext,
    ) -> Result<String, MessagingError> {
        let context =
            Context::from_serialize(values).map_err(|e| MessagingError::Template(e.to_string()))?;

        let name = template_name(kind, language);
        let name = if self.tera.get_template_names().any(|known| known == name) {
            name
        } else {
            template_name(kind, Language::En)
        };

        self.tera
            .render(&name, &context)
            .map(|text| text.trim().to_string())
            .map_err(|e| MessagingError::Template(e.to_string()))
    }
}

fn template_name(kind: PendingActionKind, language: Language) -> String {
    let stem = match kind {
        PendingActionKind::OutreachPictures => "pictures",
        PendingActionKind::OutreachAvailability => "availability",
    };
    format!("{stem}.{}.txt", language.code())
}
