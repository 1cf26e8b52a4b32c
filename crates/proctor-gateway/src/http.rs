//! HTTP gateway implementation.
//!
//! Talks JSON to the exam service:
//!
//! - `POST /api/exams/{exam_id}/attempts`: start (or reopen) an attempt
//! - `GET /api/attempts/{attempt_id}`: resume with saved answers
//! - `PUT /api/attempts/{attempt_id}/answers/{question_id}`: save one answer
//! - `POST /api/attempts/{attempt_id}/complete`: complete (idempotent)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use proctor_core::error::GatewayError;
use proctor_core::model::AnswerValue;
use proctor_core::traits::{
    AttemptEnvelope, CompletionResult, Gateway, SaveAck, SaveAnswerRequest, StartAttemptRequest,
};

pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Gateway backed by the exam service's HTTP API.
pub struct HttpGateway {
    base_url: Url,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid gateway base_url '{base_url}': {e}"))?;
        anyhow::ensure!(
            !base_url.cannot_be_a_base(),
            "gateway base_url must be an http(s) URL: {base_url}"
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;

        Ok(Self {
            base_url,
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs,
            client,
        })
    }

    /// Build `{base}/api/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("api").extend(segments);
        }
        url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
    ) -> Result<T, GatewayError> {
        let response = self.authorized(request).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout_secs)
            } else {
                GatewayError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(match status {
                404 => GatewayError::NotFound(format!("{subject}: {message}")),
                409 => GatewayError::Conflict(format!("{subject}: {message}")),
                408 => GatewayError::Timeout(self.timeout_secs),
                _ => GatewayError::Rejected { status, message },
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Decode(format!("{subject}: {e}")))
    }
}

#[derive(Serialize)]
struct StartBody<'a> {
    student_id: &'a str,
}

#[derive(Serialize)]
struct SaveBody<'a> {
    value: &'a AnswerValue,
    version: u64,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl Gateway for HttpGateway {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(exam_id = %request.exam_id))]
    async fn start_attempt(
        &self,
        request: &StartAttemptRequest,
    ) -> Result<AttemptEnvelope, GatewayError> {
        let url = self.url(&["exams", &request.exam_id, "attempts"]);
        let body = StartBody {
            student_id: &request.student_id,
        };
        self.send(self.client.post(url).json(&body), &format!("exam {}", request.exam_id))
            .await
    }

    #[instrument(skip(self))]
    async fn resume_attempt(&self, attempt_id: &str) -> Result<AttemptEnvelope, GatewayError> {
        let url = self.url(&["attempts", attempt_id]);
        self.send(self.client.get(url), &format!("attempt {attempt_id}"))
            .await
    }

    #[instrument(skip(self, request), fields(attempt_id = %request.attempt_id, question_id = %request.question_id, version = request.version))]
    async fn save_answer(&self, request: &SaveAnswerRequest) -> Result<SaveAck, GatewayError> {
        let url = self.url(&[
            "attempts",
            &request.attempt_id,
            "answers",
            &request.question_id,
        ]);
        let body = SaveBody {
            value: &request.value,
            version: request.version,
        };
        self.send(
            self.client.put(url).json(&body),
            &format!("attempt {}", request.attempt_id),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn complete_attempt(&self, attempt_id: &str) -> Result<CompletionResult, GatewayError> {
        let url = self.url(&["attempts", attempt_id, "complete"]);
        self.send(self.client.post(url), &format!("attempt {attempt_id}"))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn envelope_json() -> serde_json::Value {
        serde_json::json!({
            "attempt": {
                "id": "att-1",
                "exam_id": "geo-101",
                "student_id": "s-42",
                "started_at": "2026-03-01T09:00:00Z",
                "status": "in_progress",
                "question_ids": ["q1", "q2"],
                "time_limit_secs": 1800
            },
            "questions": [
                {"id": "q1", "kind": "single_choice", "position": 1, "marks": 1.0,
                 "payload": {"options": ["a", "b", "c"]}},
                {"id": "q2", "kind": "essay", "position": 2, "marks": 5.0}
            ]
        })
    }

    #[tokio::test]
    async fn start_attempt_posts_student() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/exams/geo-101/attempts"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(serde_json::json!({"student_id": "s-42"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(envelope_json()))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), Some("tok".into()), None).unwrap();
        let envelope = gateway
            .start_attempt(&StartAttemptRequest {
                exam_id: "geo-101".into(),
                student_id: "s-42".into(),
            })
            .await
            .unwrap();

        assert_eq!(envelope.attempt.id, "att-1");
        assert_eq!(envelope.attempt.time_limit_secs, Some(1800));
        assert_eq!(envelope.questions.len(), 2);
        assert!(envelope.answers.is_empty());
    }

    #[tokio::test]
    async fn save_answer_puts_value_and_version() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/api/attempts/att-1/answers/q1"))
            .and(body_json(serde_json::json!({
                "value": {"type": "choice", "value": "b"},
                "version": 3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "question_id": "q1",
                "version": 3,
                "saved_at": "2026-03-01T09:05:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), None, None).unwrap();
        let ack = gateway
            .save_answer(&SaveAnswerRequest {
                attempt_id: "att-1".into(),
                question_id: "q1".into(),
                value: AnswerValue::Choice("b".into()),
                version: 3,
            })
            .await
            .unwrap();
        assert_eq!(ack.version, 3);
    }

    #[tokio::test]
    async fn ids_are_percent_encoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/attempts/att%2F1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(envelope_json()))
            .expect(1)
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), None, None).unwrap();
        gateway.resume_attempt("att/1").await.unwrap();
    }

    #[tokio::test]
    async fn status_codes_map_to_taxonomy() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/exams/closed/attempts"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"message": "exam is not open"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/exams/done/attempts"))
            .respond_with(ResponseTemplate::new(409).set_body_string("already completed"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/attempts/att-1/complete"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), None, None).unwrap();
        let start = |exam: &str| StartAttemptRequest {
            exam_id: exam.into(),
            student_id: "s-1".into(),
        };

        let err = gateway.start_attempt(&start("closed")).await.unwrap_err();
        assert_eq!(err, GatewayError::NotFound("exam closed: exam is not open".into()));

        let err = gateway.start_attempt(&start("done")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(m) if m.contains("already completed")));

        let err = gateway.complete_attempt("att-1").await.unwrap_err();
        assert_eq!(
            err,
            GatewayError::Rejected {
                status: 503,
                message: "maintenance".into()
            }
        );
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/attempts/att-1/complete"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), None, None).unwrap();
        let err = gateway.complete_attempt("att-1").await.unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/attempts/att-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(envelope_json())
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let gateway = HttpGateway::new(&server.uri(), None, Some(1)).unwrap();
        let err = gateway.resume_attempt("att-1").await.unwrap_err();
        assert_eq!(err, GatewayError::Timeout(1));
    }

    #[test]
    fn rejects_unusable_base_url() {
        assert!(HttpGateway::new("not a url", None, None).is_err());
        assert!(HttpGateway::new("mailto:exam@example.com", None, None).is_err());
    }

    #[test]
    fn url_joins_segments() {
        let gateway = HttpGateway::new("http://exam.local/base/", None, None).unwrap();
        assert_eq!(
            gateway.url(&["attempts", "a1", "complete"]).as_str(),
            "http://exam.local/base/api/attempts/a1/complete"
        );
    }
}
