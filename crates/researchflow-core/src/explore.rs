//! Natural-language article search: query rewriting plus the index search.

use serde::Deserialize;

use crate::fragment::extract_first_json_object;
use crate::generator::{GenerationOptions, TextGenerator};
use crate::scholar::{ArticleHit, SearchFilters, SemanticScholar};
use crate::text_utils::strip_code_fences;
use crate::CoreError;

#[derive(Deserialize)]
struct KeywordReply {
    keywords: String,
}

/// Rewrite `natural_query` into search keywords with the generator.
///
/// Falls back to the original query on any failure.
pub async fn optimize_query(generator: &dyn TextGenerator, natural_query: &str) -> String {
    let prompt = keyword_prompt(natural_query);
    let options = GenerationOptions::default().with_max_output_tokens(512);
    let raw = match generator.generate(&prompt, &options).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "query optimization failed, using the original query");
            return natural_query.to_string();
        }
    };
    match parse_keywords(&raw) {
        Some(keywords) => {
            tracing::info!(query = %natural_query, keywords = %keywords, "optimized search query");
            keywords
        }
        None => {
            tracing::warn!(reply = %crate::text_utils::truncate_chars(&raw, 200), "unusable keyword reply, using the original query");
            natural_query.to_string()
        }
    }
}

/// Optionally rewrite the query, then search the index.
pub async fn search_articles(
    index: &SemanticScholar,
    generator: Option<&dyn TextGenerator>,
    natural_query: &str,
    filters: &SearchFilters,
) -> Result<Vec<ArticleHit>, CoreError> {
    let natural_query = natural_query.trim();
    if natural_query.is_empty() {
        return Err(CoreError::InvalidInput("search query is empty".into()));
    }
    let query = match generator {
        Some(generator) => optimize_query(generator, natural_query).await,
        None => natural_query.to_string(),
    };
    index.search(&query, filters).await
}

fn parse_keywords(raw: &str) -> Option<String> {
    let cleaned = strip_code_fences(raw);
    let reply: KeywordReply = serde_json::from_str(cleaned)
        .ok()
        .or_else(|| serde_json::from_str(extract_first_json_object(cleaned)?).ok())?;
    let keywords = reply.keywords.trim();
    (!keywords.is_empty()).then(|| keywords.to_string())
}

fn keyword_prompt(query: &str) -> String {
    format!(
        r#"You are a research assistant who optimizes searches for Semantic Scholar. Your only task is to turn the user's query into the most effective search terms.

Follow these rules strictly:
1. Identify the main concepts: isolate the nouns and technical terms of the query.
2. Expand (original language + English): for each main concept, include the original term AND its technical English equivalent.
3. Detect specific filters:
   * Language: if the user asks for a language ("in Portuguese", "in German"), add the matching filter (language:pt, language:en, language:de, ...).
   * Author: if the user mentions an author ("by Alan Turing"), add author:"Author Name".
4. Combine the expanded terms and the filters into a single search string.
5. Your answer MUST be a valid JSON object with a single key named "keywords".

Examples:
- User query: "inteligencia artificial no futebol"
  Output: {{"keywords": "inteligencia artificial IA artificial intelligence futebol soccer football"}}
- User query: "inteligencia artificial no futebol em português"
  Output: {{"keywords": "inteligencia artificial IA artificial intelligence futebol soccer football language:pt"}}
- User query: "papers by Alan Turing about computation in English"
  Output: {{"keywords": "computation author:\"Alan Turing\" language:en"}}

Process the following user query:
User query: "{query}"
Output:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::mock::{MockGenerator, MockReply};

    #[tokio::test]
    async fn uses_generator_keywords() {
        let generator = MockGenerator::replying(
            "```json\n{\"keywords\": \"aprendizado de máquina machine learning language:pt\"}\n```",
        );
        let query = optimize_query(&generator, "aprendizado de máquina em português").await;
        assert_eq!(query, "aprendizado de máquina machine learning language:pt");
        assert!(
            generator
                .last_prompt()
                .unwrap()
                .contains("\"aprendizado de máquina em português\"")
        );
    }

    #[tokio::test]
    async fn falls_back_on_generator_error() {
        let generator = MockGenerator::new(MockReply::Error("quota".into()));
        assert_eq!(optimize_query(&generator, "graph neural nets").await, "graph neural nets");
    }

    #[tokio::test]
    async fn falls_back_on_unusable_reply() {
        let generator = MockGenerator::replying("Sorry, I can't help with that.");
        assert_eq!(optimize_query(&generator, "q").await, "q");

        let generator = MockGenerator::replying(r#"{"terms": "wrong key"}"#);
        assert_eq!(optimize_query(&generator, "q").await, "q");

        let generator = MockGenerator::replying(r#"{"keywords": "   "}"#);
        assert_eq!(optimize_query(&generator, "q").await, "q");
    }

    #[test]
    fn keywords_recovered_from_chatter() {
        assert_eq!(
            parse_keywords("Here: {\"keywords\": \"a b\"} done").as_deref(),
            Some("a b")
        );
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let index = SemanticScholar::new(
            reqwest::Client::new(),
            Some("key".into()),
            std::time::Duration::from_secs(1),
        );
        let err = search_articles(&index, None, "  ", &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}
