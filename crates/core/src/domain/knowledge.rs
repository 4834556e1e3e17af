use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub keywords: Vec<String>,
    pub is_active: bool,
}

impl KnowledgeArticle {
    /// Number of query terms found in the title, keywords or body.
    pub fn match_score(&self, terms: &[String]) -> usize {
        let title = self.title.to_lowercase();
        let body = self.body.to_lowercase();
        terms
            .iter()
            .map(|term| {
                let in_keywords =
                    self.keywords.iter().any(|keyword| keyword.eq_ignore_ascii_case(term));
                usize::from(title.contains(term.as_str())) * 2
                    + usize::from(in_keywords) * 2
                    + usize::from(body.contains(term.as_str()))
            })
            .sum()
    }
}
