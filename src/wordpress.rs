//! [`ProgressGateway`] over the WordPress REST API.
//!
//! Units are `icn_unit` posts tagged with a `course_id` meta value. Progress
//! records are `icn_grade` posts tagged with `student_id`; each update creates
//! a new post, and on read all records of a unit are folded so completion never
//! goes backwards. Listings follow `X-WP-TotalPages` until every page is read.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::error::Error;
use crate::jwks::FETCH_TIMEOUT;
use crate::middleware::ProgressGateway;
use crate::progress::{ProgressReceipt, ProgressRecord, Unit, UnitContent, UnitProgress};

const PAGE_SIZE: &str = "100";
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// WordPress-backed content and progress store.
#[derive(Clone)]
pub struct WordPressGateway {
    api_base: Url,
    credentials: Option<Credentials>,
    http: reqwest::Client,
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    id: u64,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    meta: Map<String, JsonValue>,
}

impl WordPressGateway {
    /// Gateway for the site at `site_url` (the REST root is `site_url/wp-json/wp/v2/`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `site_url` cannot be a base URL, or
    /// [`Error::Http`] if the HTTP client cannot be built.
    pub fn new(site_url: &Url) -> Result<Self, Error> {
        let mut site = site_url.clone();
        if !site.path().ends_with('/') {
            let path = format!("{}/", site.path());
            site.set_path(&path);
        }
        let api_base = site
            .join("wp-json/wp/v2/")
            .map_err(|e| Error::Config(format!("WORDPRESS_URL: {e}")))?;

        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            api_base,
            credentials: None,
            http,
        })
    }

    /// Configure from `WORDPRESS_URL`, `WORDPRESS_API_USER` and `WORDPRESS_API_PASSWORD`.
    ///
    /// Credentials are optional; both must be set to be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `WORDPRESS_URL` is missing or invalid.
    pub fn from_env() -> Result<Self, Error> {
        let site_url: Url = std::env::var("WORDPRESS_URL")
            .map_err(|_| Error::Config("WORDPRESS_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("WORDPRESS_URL: {e}")))?;

        let gateway = Self::new(&site_url)?;
        match (
            std::env::var("WORDPRESS_API_USER"),
            std::env::var("WORDPRESS_API_PASSWORD"),
        ) {
            (Ok(user), Ok(password)) => Ok(gateway.with_credentials(user, password)),
            _ => Ok(gateway),
        }
    }

    /// Use HTTP Basic authentication (WordPress application passwords).
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::Upstream`] on a non-2xx response.
    pub async fn fetch_course_units(&self, course_id: &str) -> Result<Vec<Unit>, Error> {
        let posts = self
            .list("icn_unit", "course_id", course_id, "course units")
            .await?;
        Ok(posts.into_iter().map(unit_from_post).collect())
    }

    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::Upstream`] on a non-2xx response.
    pub async fn fetch_student_progress(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<HashMap<String, UnitProgress>, Error> {
        let posts = self
            .list("icn_grade", "student_id", student_id, "student progress")
            .await?;
        Ok(progress_by_unit(posts, course_id))
    }

    /// One unit with its content blocks and layout; `None` if WordPress has no such unit.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::Upstream`] on any other non-2xx response.
    pub async fn fetch_unit_content(&self, unit_id: &str) -> Result<Option<UnitContent>, Error> {
        if unit_id.is_empty() || !unit_id.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(None);
        }
        let url = self.endpoint(&format!("icn_unit/{unit_id}"))?;
        let response = self.authorize(self.http.get(url)).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(unit_id, "Unit not found in WordPress");
            return Ok(None);
        }
        let response = ensure_success(response, "unit content").await?;
        let post: WpPost = response.json().await?;
        let structure = meta_json(&post.meta, "unit_structure");
        Ok(Some(UnitContent {
            unit: unit_from_post(post),
            structure,
        }))
    }

    /// # Errors
    ///
    /// [`Error::Http`] on network failure, [`Error::Upstream`] on a non-2xx response.
    pub async fn save_progress(&self, record: &ProgressRecord) -> Result<ProgressReceipt, Error> {
        let url = self.endpoint("icn_grade")?;
        let body = json!({
            "title": format!(
                "Progress - student {} - unit {}",
                record.student_id, record.unit_id
            ),
            "content": "Student progress record",
            "status": "publish",
            "meta": {
                "student_id": record.student_id,
                "unit_id": record.unit_id,
                "content_id": record.content_id,
                "course_id": record.course_id,
                "completion_percentage": record.completion_percentage,
                "score": record.score,
                "completed": if record.completed { "true" } else { "false" },
                "last_updated": record.recorded_at.format(&Rfc3339).ok(),
            }
        });

        let response = self.authorize(self.http.post(url)).json(&body).send().await?;
        let response = ensure_success(response, "save progress").await?;
        let post: WpPost = response.json().await?;

        tracing::info!(
            student_id = %record.student_id,
            unit_id = %record.unit_id,
            record_id = post.id,
            "Progress recorded"
        );
        Ok(ProgressReceipt {
            success: true,
            record_id: Some(post.id.to_string()),
        })
    }

    async fn list(
        &self,
        post_type: &str,
        meta_key: &str,
        meta_value: &str,
        operation: &'static str,
    ) -> Result<Vec<WpPost>, Error> {
        let mut posts = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut url = self.endpoint(post_type)?;
            url.query_pairs_mut()
                .append_pair("meta_key", meta_key)
                .append_pair("meta_value", meta_value)
                .append_pair("per_page", PAGE_SIZE)
                .append_pair("page", &page.to_string());

            let response = self.authorize(self.http.get(url)).send().await?;
            let response = ensure_success(response, operation).await?;
            let total_pages = total_pages(&response);
            let batch: Vec<WpPost> = response.json().await?;
            let last = batch.is_empty() || page >= total_pages;
            posts.extend(batch);
            if last {
                break;
            }
            page += 1;
        }
        tracing::debug!(post_type, pages = page, count = posts.len(), "WordPress query completed");
        Ok(posts)
    }

    fn endpoint(&self, post_type: &str) -> Result<Url, Error> {
        self.api_base
            .join(post_type)
            .map_err(|e| Error::Config(format!("invalid WordPress endpoint {post_type}: {e}")))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        }
    }
}

impl std::fmt::Debug for WordPressGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordPressGateway")
            .field("api_base", &self.api_base.as_str())
            .field("authenticated", &self.credentials.is_some())
            .finish_non_exhaustive()
    }
}

impl ProgressGateway for WordPressGateway {
    async fn course_units(
        &self,
        course_id: &str,
    ) -> Result<Vec<Unit>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.fetch_course_units(course_id).await?)
    }

    async fn student_progress(
        &self,
        student_id: &str,
        course_id: &str,
    ) -> Result<HashMap<String, UnitProgress>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.fetch_student_progress(student_id, course_id).await?)
    }

    async fn record_progress(
        &self,
        record: ProgressRecord,
    ) -> Result<ProgressReceipt, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.save_progress(&record).await?)
    }

    async fn unit_content(
        &self,
        unit_id: &str,
    ) -> Result<Option<UnitContent>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.fetch_unit_content(unit_id).await?)
    }
}

/// Page count advertised by WordPress; a missing or garbled header means one page.
fn total_pages(response: &reqwest::Response) -> u32 {
    response
        .headers()
        .get(TOTAL_PAGES_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream {
        operation,
        status: Some(status),
        detail: body,
    })
}

fn unit_from_post(post: WpPost) -> Unit {
    let meta = &post.meta;
    Unit {
        id: post.id.to_string(),
        title: post.title.rendered,
        description: post.content.rendered,
        unit_type: meta_string(meta, "unit_type").unwrap_or_else(|| "lesson".into()),
        duration: meta_f64(meta, "estimated_duration")
            .map_or(30, |d| d.clamp(0.0, f64::from(u32::MAX)) as u32),
        difficulty: meta_string(meta, "difficulty_level"),
        order: meta_f64(meta, "order_index").map_or(0, |o| o as i64),
        content: match meta_json(meta, "unit_content") {
            Some(JsonValue::Array(blocks)) => blocks,
            _ => Vec::new(),
        },
    }
}

fn progress_by_unit(posts: Vec<WpPost>, course_id: &str) -> HashMap<String, UnitProgress> {
    let mut by_unit: HashMap<String, UnitProgress> = HashMap::new();
    for post in posts {
        let meta = &post.meta;
        let Some(unit_id) = meta_string(meta, "unit_id") else {
            continue;
        };
        if meta_string(meta, "course_id").is_some_and(|c| c != course_id) {
            continue;
        }

        let progress = UnitProgress {
            completion_percentage: meta_f64(meta, "completion_percentage")
                .map_or(0, |p| p.clamp(0.0, 100.0) as u8),
            score: meta_f64(meta, "score").unwrap_or(0.0),
            completed: meta_bool(meta, "completed"),
            last_updated: meta_string(meta, "last_updated")
                .and_then(|s| OffsetDateTime::parse(&s, &Rfc3339).ok()),
        };

        by_unit
            .entry(unit_id)
            .and_modify(|folded| folded.absorb(&progress))
            .or_insert(progress);
    }
    by_unit
}

/// Single-valued meta fields may come back as a one-element array.
fn meta_value<'a>(meta: &'a Map<String, JsonValue>, key: &str) -> Option<&'a JsonValue> {
    match meta.get(key)? {
        JsonValue::Array(values) => values.first(),
        JsonValue::Null => None,
        value => Some(value),
    }
}

/// Structured meta is stored as a JSON string; already-decoded values pass through.
fn meta_json(meta: &Map<String, JsonValue>, key: &str) -> Option<JsonValue> {
    let encoded = match meta.get(key)? {
        JsonValue::String(s) => s,
        JsonValue::Array(values) => match values.as_slice() {
            [JsonValue::String(s)] => s,
            _ => return Some(JsonValue::Array(values.clone())),
        },
        JsonValue::Null => return None,
        value => return Some(value.clone()),
    };
    if encoded.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(encoded) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Unparseable JSON meta value");
            None
        }
    }
}

fn meta_string(meta: &Map<String, JsonValue>, key: &str) -> Option<String> {
    match meta_value(meta, key)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn meta_f64(meta: &Map<String, JsonValue>, key: &str) -> Option<f64> {
    match meta_value(meta, key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

fn meta_bool(meta: &Map<String, JsonValue>, key: &str) -> bool {
    match meta_value(meta, key) {
        Some(JsonValue::Bool(b)) => *b,
        Some(JsonValue::String(s)) => matches!(s.as_str(), "true" | "1"),
        Some(JsonValue::Number(n)) => n.as_u64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::progress::ProgressUpdate;

    fn gateway(server: &MockServer) -> WordPressGateway {
        WordPressGateway::new(&server.uri().parse().unwrap()).unwrap()
    }

    fn grade(unit_id: &str, completed: &str, last_updated: &str) -> JsonValue {
        json!({
            "id": 1,
            "title": { "rendered": "grade" },
            "meta": {
                "unit_id": unit_id,
                "course_id": "course-42",
                "completion_percentage": "100",
                "score": 95,
                "completed": completed,
                "last_updated": last_updated
            }
        })
    }

    #[test]
    fn test_api_base_handles_trailing_slash() {
        for site in ["https://cms.example", "https://cms.example/", "https://cms.example/blog"] {
            let gateway = WordPressGateway::new(&site.parse().unwrap()).unwrap();
            assert!(gateway.api_base().as_str().ends_with("/wp-json/wp/v2/"), "{site}");
        }
        let nested = WordPressGateway::new(&"https://cms.example/blog".parse().unwrap()).unwrap();
        assert_eq!(nested.api_base().as_str(), "https://cms.example/blog/wp-json/wp/v2/");
    }

    #[tokio::test]
    async fn test_course_units_maps_meta() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_unit"))
            .and(query_param("meta_key", "course_id"))
            .and(query_param("meta_value", "course-42"))
            .and(query_param("per_page", "100"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 12,
                    "title": { "rendered": "Fractions" },
                    "content": { "rendered": "<p>Intro</p>" },
                    "meta": {
                        "unit_type": "quiz",
                        "estimated_duration": "45",
                        "order_index": 2,
                        "unit_content": "[{\"type\":\"text\",\"body\":\"Halves\"}]"
                    }
                },
                { "id": 13, "title": { "rendered": "Bare" } }
            ])))
            .mount(&server)
            .await;

        let units = gateway(&server).fetch_course_units("course-42").await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "12");
        assert_eq!(units[0].unit_type, "quiz");
        assert_eq!(units[0].duration, 45);
        assert_eq!(units[0].order, 2);
        assert_eq!(units[0].content, [json!({ "type": "text", "body": "Halves" })]);
        assert_eq!(units[1].unit_type, "lesson");
        assert_eq!(units[1].duration, 30);
        assert!(units[1].content.is_empty());
    }

    #[tokio::test]
    async fn test_listing_reads_every_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_grade"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "2")
                    .set_body_json(json!([grade("unit-b", "true", "2024-05-01T10:00:00Z")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_grade"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-WP-TotalPages", "2")
                    .set_body_json(json!([grade("unit-a", "true", "2024-05-02T10:00:00Z")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let progress = gateway(&server)
            .fetch_student_progress("u1", "course-42")
            .await
            .unwrap();
        assert!(progress["unit-a"].completed);
        assert!(progress["unit-b"].completed);
    }

    #[tokio::test]
    async fn test_unit_pages_follow_total_pages_header() {
        let server = MockServer::start().await;
        for page in 1..=3 {
            Mock::given(method("GET"))
                .and(path("/wp-json/wp/v2/icn_unit"))
                .and(query_param("page", page.to_string()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("X-WP-TotalPages", "3")
                        .set_body_json(json!([{ "id": page, "title": { "rendered": "U" } }])),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let units = gateway(&server).fetch_course_units("course-42").await.unwrap();
        let ids: Vec<&str> = units.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_unit_content_maps_content_and_structure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_unit/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 12,
                "title": { "rendered": "Fractions" },
                "meta": {
                    "unit_content": ["[{\"type\":\"video\",\"src\":\"a.mp4\"}]"],
                    "unit_structure": "{\"sections\":[\"intro\",\"quiz\"]}",
                    "difficulty_level": "beginner"
                }
            })))
            .mount(&server)
            .await;

        let unit = gateway(&server).fetch_unit_content("12").await.unwrap().unwrap();
        assert_eq!(unit.unit.title, "Fractions");
        assert_eq!(unit.unit.difficulty.as_deref(), Some("beginner"));
        assert_eq!(unit.unit.content[0]["src"], "a.mp4");
        assert_eq!(unit.structure, Some(json!({ "sections": ["intro", "quiz"] })));
    }

    #[tokio::test]
    async fn test_unknown_unit_content_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_unit/404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": "rest_post_invalid_id"
            })))
            .mount(&server)
            .await;

        let gateway = gateway(&server);
        assert!(gateway.fetch_unit_content("404").await.unwrap().is_none());
        assert!(gateway.fetch_unit_content("../users").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_records_fold_per_unit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_grade"))
            .and(query_param("meta_value", "u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                grade("12", "true", "2024-05-01T10:00:00Z"),
                grade("12", "false", "2024-05-02T10:00:00Z"),
                grade("12", "false", "2024-04-01T10:00:00Z"),
            ])))
            .mount(&server)
            .await;

        let progress = gateway(&server)
            .fetch_student_progress("u1", "course-42")
            .await
            .unwrap();
        assert!(progress["12"].completed);
        assert_eq!(progress["12"].completion_percentage, 100);
        assert_eq!(progress["12"].score, 95.0);
        assert_eq!(
            progress["12"].last_updated,
            Some(OffsetDateTime::parse("2024-05-02T10:00:00Z", &Rfc3339).unwrap())
        );
    }

    #[tokio::test]
    async fn test_progress_from_other_course_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wp-json/wp/v2/icn_grade"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([grade("12", "true", "2024-05-02T10:00:00Z")])),
            )
            .mount(&server)
            .await;

        let progress = gateway(&server)
            .fetch_student_progress("u1", "course-7")
            .await
            .unwrap();
        assert!(progress.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let err = gateway(&server).fetch_course_units("course-42").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Upstream {
                status: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_save_progress_posts_grade_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wp-json/wp/v2/icn_grade"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "status": "publish",
                "meta": { "student_id": "u1", "unit_id": "12", "completed": "true" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 99 })))
            .expect(1)
            .mount(&server)
            .await;

        let record = ProgressRecord::new(
            "u1",
            Some("course-42"),
            ProgressUpdate {
                unit_id: "12".into(),
                content_id: "c1".into(),
                completed: true,
                score: Some(80.0),
                completion_percentage: None,
            },
        );
        let receipt = gateway(&server)
            .with_credentials("api", "app-password")
            .save_progress(&record)
            .await
            .unwrap();
        assert_eq!(receipt.record_id.as_deref(), Some("99"));
    }

    #[test]
    fn test_meta_bool_variants() {
        let meta: Map<String, JsonValue> = serde_json::from_value(json!({
            "a": "true", "b": true, "c": "false", "d": 1, "e": ["true"]
        }))
        .unwrap();
        assert!(meta_bool(&meta, "a"));
        assert!(meta_bool(&meta, "b"));
        assert!(!meta_bool(&meta, "c"));
        assert!(meta_bool(&meta, "d"));
        assert!(meta_bool(&meta, "e"));
        assert!(!meta_bool(&meta, "missing"));
    }
}
