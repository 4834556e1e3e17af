use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::{QueryBuilder, Row};

use concierge_core::domain::knowledge::KnowledgeArticle;

use super::{rank_articles, KnowledgeRepository, RepositoryError};
use crate::DbPool;

pub struct SqlKnowledgeRepository {
    pool: DbPool,
}

impl SqlKnowledgeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_article(row: &SqliteRow) -> Result<KnowledgeArticle, RepositoryError> {
    let keywords_json: String =
        row.try_get("keywords_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid keywords: {e}")))?;

    Ok(KnowledgeArticle {
        id: row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        title: row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        body: row.try_get("body").map_err(|e| RepositoryError::Decode(e.to_string()))?,
        keywords,
        is_active: row.try_get("is_active").map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

#[async_trait::async_trait]
impl KnowledgeRepository for SqlKnowledgeRepository {
    async fn search(
        &self,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KnowledgeArticle>, RepositoryError> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, title, body, keywords_json, is_active FROM knowledge_article
             WHERE is_active = 1 AND (",
        );
        let mut separated = builder.separated(" OR ");
        for term in terms {
            let pattern = format!("%{}%", term.to_lowercase());
            separated.push("LOWER(title || ' ' || body || ' ' || keywords_json) LIKE ");
            separated.push_bind_unseparated(pattern);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let articles = rows.iter().map(row_to_article).collect::<Result<Vec<_>, _>>()?;
        Ok(rank_articles(articles, terms, limit))
    }

    async fn save(&self, article: KnowledgeArticle) -> Result<i64, RepositoryError> {
        let keywords_json = serde_json::to_string(&article.keywords)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let id: Option<i64> = (article.id > 0).then_some(article.id);

        let saved_id: i64 = sqlx::query_scalar(
            "INSERT INTO knowledge_article (id, title, body, keywords_json, is_active)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 body = excluded.body,
                 keywords_json = excluded.keywords_json,
                 is_active = excluded.is_active
             RETURNING id",
        )
        .bind(id)
        .bind(&article.title)
        .bind(&article.body)
        .bind(keywords_json)
        .bind(article.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved_id)
    }
}
