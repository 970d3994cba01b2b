/*!
 * Prompt template for term extraction.
 *
 * The template asks the model for one block per term in the
 * `Термин / Определение / Перевод / Релевантность` layout that the result
 * merger understands.
 */

/// Extraction prompt with `{domain}` and `{text}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    /// The template string with placeholders
    template: String,
}

impl PromptTemplate {
    /// Default Russian-language extraction prompt.
    pub const TERM_EXTRACTOR: &'static str = "Извлеки из текста термины, связанные с {domain}.
Верни результат строго в следующем формате для каждого термина:

Термин: [термин]
Определение: [определение]
Перевод: [перевод на английский]
Релевантность: [процент]%

Текст для анализа:
{text}";

    /// Default domain label.
    pub const DEFAULT_DOMAIN: &'static str =
        "беспилотными авиационными системами (БАС) и беспилотными летательными аппаратами (БПЛА)";

    /// Create a new prompt template.
    pub fn new(template: &str) -> Self {
        Self {
            template: template.to_string(),
        }
    }

    /// Create the default term extractor template.
    pub fn term_extractor() -> Self {
        Self::new(Self::TERM_EXTRACTOR)
    }

    /// Whether the template has a place for the chunk text.
    pub fn has_text_placeholder(&self) -> bool {
        self.template.contains("{text}")
    }

    /// Render the template for one chunk.
    pub fn render(&self, domain: &str, text: &str) -> String {
        // Text goes in last so placeholders inside the document stay literal
        self.template
            .replace("{domain}", domain)
            .replace("{text}", text)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::term_extractor()
    }
}
