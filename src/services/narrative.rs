//! Review summaries and place comparisons written by a language model.
//!
//! Generation runs outside the recommendation core: nothing here reads or
//! invalidates the snapshot cache. Responses are cached in Redis by prompt.

use std::sync::Arc;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::{
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{Place, Review, Snapshot},
};

/// Review text beyond this many characters is cut off
const MAX_REVIEW_CHARS: usize = 10_000;
/// Reviews this short or shorter say nothing worth summarizing
const MIN_CONTENT_CHARS: usize = 5;
/// Less text than this yields no summary at all
const MIN_TEXT_CHARS: usize = 10;

const SYSTEM_PROMPT: &str = "You summarize restaurant reviews. Answer only in the requested format.";

const OVERVIEW: &str = "Overview:";
const MENU: &str = "Recommended dishes:";
const TIME: &str = "Best time to visit:";
const AMBIENCE: &str = "Ambience:";
const AUDIENCE: &str = "Good for:";

/// Something that turns a prompt into text
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String>;
}

/// Chat completion against an Ollama server
#[derive(Clone)]
pub struct OllamaGenerator {
    http_client: HttpClient,
    api_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f64,
    top_p: f64,
    repeat_penalty: f64,
    num_ctx: u32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.5,
            repeat_penalty: 1.2,
            num_ctx: 4096,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

impl OllamaGenerator {
    pub fn new(api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        let url = format!("{}/api/chat", self.api_url);
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
            options: ChatOptions::default(),
        };

        let response = self.http_client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Ollama returned status {}: {}",
                status, body
            )));
        }

        let chat: ChatResponse = response.json().await?;
        let text = chat
            .message
            .map(|m| m.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| AppError::ExternalApi("No response from model".to_string()))?;

        tracing::info!(
            model = %self.model,
            prompt_chars = user_prompt.len(),
            response_chars = text.len(),
            "Text generated"
        );
        Ok(text)
    }
}

/// The five labelled lines of a place summary; `-` where the model gave none
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaceSections {
    pub overview: String,
    pub menu: String,
    pub time: String,
    pub ambience: String,
    pub audience: String,
}

impl Default for PlaceSections {
    fn default() -> Self {
        Self {
            overview: "-".to_string(),
            menu: "-".to_string(),
            time: "-".to_string(),
            ambience: "-".to_string(),
            audience: "-".to_string(),
        }
    }
}

impl PlaceSections {
    pub fn parse(text: &str) -> Self {
        let mut sections = Self::default();
        for line in text.lines().map(str::trim) {
            let slot = if line.contains(OVERVIEW) {
                &mut sections.overview
            } else if line.contains(MENU) {
                &mut sections.menu
            } else if line.contains(TIME) {
                &mut sections.time
            } else if line.contains(AMBIENCE) {
                &mut sections.ambience
            } else if line.contains(AUDIENCE) {
                &mut sections.audience
            } else {
                continue;
            };

            if let Some((_, value)) = line.split_once(':') {
                let value = value.trim_start_matches(|c: char| c == '*' || c.is_whitespace());
                if !value.is_empty() {
                    *slot = value.trim_end().to_string();
                }
            }
        }
        sections
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComparedPlace {
    pub id: i64,
    pub name: String,
    pub review_count: i64,
    pub average_rating: f64,
    pub sections: PlaceSections,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaceComparison {
    pub places: [ComparedPlace; 2],
    pub recommendation: String,
}

/// Joins review contents into one block of prompt text
///
/// Contents of five characters or fewer are skipped and the result is cut at
/// 10 000 characters. `None` when fewer than ten characters remain.
pub fn review_text<'a>(contents: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = contents
        .filter(|c| c.chars().count() > MIN_CONTENT_CHARS)
        .collect::<Vec<_>>()
        .join(" ");

    let text = if joined.chars().count() > MAX_REVIEW_CHARS {
        let mut cut: String = joined.chars().take(MAX_REVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        joined
    };

    (text.chars().count() >= MIN_TEXT_CHARS).then_some(text)
}

pub fn place_summary_prompt(text: &str) -> String {
    format!(
        "Analyze the following restaurant reviews and summarize them.\n\
         Keep it concise. Use the exact format below, without intro or footnote.\n\
         Do not ask questions back.\n\n\
         Reviews:\n\"{text}\"\n\n\
         Format:\n\
         **{OVERVIEW}** [Summary in 1 sentence]\n\
         - **{MENU}** [Specific dishes named in the reviews]\n\
         - **{TIME}** [Time of day or meal]\n\
         - **{AMBIENCE}** [Atmosphere]\n\
         - **{AUDIENCE}** [Kind of customer]\n"
    )
}

pub fn contributor_profile_prompt(name: &str, text: &str, ratings: &[i64]) -> String {
    format!(
        "Analyze the following restaurant reviews written by {name} and summarize the reviewer.\n\
         Keep it concise. Use the exact format below, without intro or footnote.\n\
         Do not ask questions back.\n\n\
         Reviews:\n\"{text}\"\n\n\
         Ratings:\n\"{ratings:?}\"\n\n\
         Format:\n\
         From the review history of **{name}**:\n\
         - **Favourite food:** [Kind of food the reviewer likes. Write N/A unless the pattern is clear.]\n\
         - **Rating style:** [How the reviewer tends to rate]\n\
         - **Other facts:** [Anything else that stands out]\n"
    )
}

pub fn comparison_prompt(a: &ComparedPlace, b: &ComparedPlace) -> String {
    format!(
        "Compare these two restaurants based on the data below and give a recommendation.\n\n\
         Restaurant A ({}): {} stars. {:?}\n\
         Restaurant B ({}): {} stars. {:?}\n",
        a.name, a.average_rating, a.sections, b.name, b.average_rating, b.sections
    )
}

/// Newest first, undated last
fn newest_first<'a>(reviews: impl Iterator<Item = &'a Review>) -> Vec<&'a Review> {
    let mut reviews: Vec<&Review> = reviews.collect();
    reviews.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    reviews
}

/// Builds prompts from snapshot data and runs them through a [`TextGenerator`]
#[derive(Clone)]
pub struct NarrativeService {
    generator: Arc<dyn TextGenerator>,
    cache: Option<Cache>,
    model: String,
    cache_ttl: u64,
}

impl NarrativeService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        cache: Option<Cache>,
        model: String,
        cache_ttl: u64,
    ) -> Self {
        Self {
            generator,
            cache,
            model,
            cache_ttl,
        }
    }

    /// Summary of one place's reviews, `None` when there is too little text
    pub async fn place_summary(&self, snapshot: &Snapshot, place_id: i64) -> Option<String> {
        let reviews = newest_first(snapshot.reviews_for_place(place_id));
        let text = review_text(reviews.iter().map(|r| r.content.as_str()))?;
        Some(self.complete(place_summary_prompt(&text)).await)
    }

    /// Profile of a contributor's reviewing habits, `None` when there is too little text
    pub async fn contributor_profile(
        &self,
        snapshot: &Snapshot,
        contributor_id: i64,
    ) -> Option<String> {
        let contributor = snapshot.contributor(contributor_id)?;
        let reviews: Vec<&Review> = newest_first(snapshot.reviews_by(&contributor.name))
            .into_iter()
            .filter(|r| snapshot.place(r.place_id).is_some())
            .collect();

        let text = review_text(reviews.iter().map(|r| r.content.as_str()))?;
        let ratings: Vec<i64> = reviews
            .iter()
            .filter(|r| r.content.chars().count() > MIN_CONTENT_CHARS)
            .map(|r| r.rating)
            .collect();

        Some(
            self.complete(contributor_profile_prompt(&contributor.name, &text, &ratings))
                .await,
        )
    }

    /// Side-by-side sections for two places and a closing recommendation
    ///
    /// Each side reuses the place summary prompt, so a summary generated for
    /// the place page is served from cache here.
    pub async fn compare(&self, snapshot: &Snapshot, a: &Place, b: &Place) -> PlaceComparison {
        let (summary_a, summary_b) = tokio::join!(
            self.place_summary(snapshot, a.id),
            self.place_summary(snapshot, b.id)
        );

        let compared = |place: &Place, summary: Option<String>| ComparedPlace {
            id: place.id,
            name: place.name.clone(),
            review_count: place.review_count,
            average_rating: place.average_rating,
            sections: summary
                .as_deref()
                .map(PlaceSections::parse)
                .unwrap_or_default(),
        };
        let places = [compared(a, summary_a), compared(b, summary_b)];
        let recommendation = self
            .complete(comparison_prompt(&places[0], &places[1]))
            .await;

        PlaceComparison {
            places,
            recommendation,
        }
    }

    /// Generated text, or an `AI Error: ...` line when generation failed
    async fn complete(&self, prompt: String) -> String {
        let generator = Arc::clone(&self.generator);
        let result: AppResult<String> = crate::cached!(
            self.cache,
            CacheKey::narrative(&self.model, &prompt),
            self.cache_ttl,
            async { generator.generate(SYSTEM_PROMPT, &prompt).await }
        );

        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, model = %self.model, "Text generation failed");
                format!("AI Error: {}.", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawCatalog;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        Snapshot::from_raw(&RawCatalog {
            places: vec![
                json!({"id": 1, "name": "Noodle Bar", "average_rating": 4.5}),
                json!({"id": 2, "name": "Quiet Cafe", "average_rating": 3.0}),
            ],
            reviews: vec![
                json!({"restaurant_id": 1, "reviewer_name": "Ann", "rating": 5, "content": "older review of the broth", "timestamp": "2024-01-01"}),
                json!({"restaurant_id": 1, "reviewer_name": "Ann", "rating": 4, "content": "newest review, spicy", "timestamp": "2024-05-01"}),
                json!({"restaurant_id": 1, "reviewer_name": "Bo", "rating": 3, "content": "ok"}),
                json!({"restaurant_id": 2, "reviewer_name": "Bo", "rating": 2, "content": "meh"}),
            ],
            contributors: vec![
                json!({"reviewer_id": 10, "name": "Ann"}),
                json!({"reviewer_id": 11, "name": "Bo"}),
            ],
            ..Default::default()
        })
    }

    fn service(generator: MockTextGenerator) -> NarrativeService {
        NarrativeService::new(Arc::new(generator), None, "gemma3:1b".to_string(), 60)
    }

    #[test]
    fn test_review_text_skips_short_contents() {
        let text = review_text(["ok", "great noodles", "yum", "friendly staff"].into_iter());
        assert_eq!(text.as_deref(), Some("great noodles friendly staff"));
        assert_eq!(review_text(["ok", "fine"].into_iter()), None);
        assert_eq!(review_text(["abcdef"].into_iter()), None);
    }

    #[test]
    fn test_review_text_truncates_long_input() {
        let long = "x".repeat(MAX_REVIEW_CHARS + 50);
        let text = review_text(std::iter::once(long.as_str())).unwrap();
        assert_eq!(text.chars().count(), MAX_REVIEW_CHARS + 3);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn test_parse_sections() {
        let text = "**Overview:** Busy noodle shop\n\
                    - **Recommended dishes:** Beef noodles, dumplings\n\
                    - **Ambience:**\n\
                    - **Good for:** Families";
        let sections = PlaceSections::parse(text);
        assert_eq!(sections.overview, "Busy noodle shop");
        assert_eq!(sections.menu, "Beef noodles, dumplings");
        assert_eq!(sections.time, "-");
        assert_eq!(sections.ambience, "-");
        assert_eq!(sections.audience, "Families");
    }

    #[tokio::test]
    async fn test_place_summary_prompt_has_newest_review_first() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, prompt| {
                prompt.contains("\"newest review, spicy older review of the broth\"")
            })
            .times(1)
            .returning(|_, _| Ok("**Overview:** Good".to_string()));

        let summary = service(generator).place_summary(&snapshot(), 1).await;
        assert_eq!(summary.as_deref(), Some("**Overview:** Good"));
    }

    #[tokio::test]
    async fn test_too_little_text_skips_generation() {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().never();

        let narrative = service(generator);
        assert!(narrative.place_summary(&snapshot(), 2).await.is_none());
        assert!(narrative.contributor_profile(&snapshot(), 11).await.is_none());
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_error_text() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(AppError::ExternalApi("connection refused".to_string())));

        let summary = service(generator)
            .contributor_profile(&snapshot(), 10)
            .await
            .unwrap();
        assert!(summary.starts_with("AI Error:"));
        assert!(summary.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_compare_fills_missing_sections() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .withf(|_, prompt| prompt.starts_with("Analyze"))
            .times(1)
            .returning(|_, _| Ok("**Overview:** Noodles\n- **Good for:** Groups".to_string()));
        generator
            .expect_generate()
            .withf(|_, prompt| prompt.starts_with("Compare"))
            .times(1)
            .returning(|_, _| Ok("Pick Noodle Bar".to_string()));

        let snapshot = snapshot();
        let a = snapshot.place(1).unwrap().clone();
        let b = snapshot.place(2).unwrap().clone();
        let comparison = service(generator).compare(&snapshot, &a, &b).await;

        assert_eq!(comparison.places[0].sections.overview, "Noodles");
        assert_eq!(comparison.places[0].sections.audience, "Groups");
        assert_eq!(comparison.places[1].sections, PlaceSections::default());
        assert_eq!(comparison.recommendation, "Pick Noodle Bar");
    }

    #[test]
    fn test_chat_request_body() {
        let request = ChatRequest {
            model: "gemma3:1b",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "sys",
                },
                ChatMessage {
                    role: "user",
                    content: "hi",
                },
            ],
            stream: false,
            options: ChatOptions::default(),
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["stream"], json!(false));
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["options"]["num_ctx"], 4096);
        assert_eq!(body["options"]["temperature"], 0.1);
    }
}
