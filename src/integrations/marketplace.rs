// src/integrations/marketplace.rs — Marketplace REST client
//
// JSON over HTTP against the configured base URL. Draft mutations carry the
// draft's version token in `If-Match`; the new token comes back in `ETag`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::infra::config::MarketplaceConfig;
use crate::infra::errors::{BotError, Result};
use crate::integrations::types::{
    AuthService, CategoryEntry, CategoryFields, CategoryPrediction, Credentials, DeliveryOptions,
    FieldOption, FieldPatch, FieldSpec, ListingService, ListingSummary, LoginStep, Page,
    RemoteDraft,
};

pub struct MarketplaceClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl MarketplaceClient {
    pub fn new(config: &MarketplaceConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder, auth: &Credentials) -> RequestBuilder {
        builder
            .bearer_auth(&auth.access_token)
            .header("X-Device-Id", &auth.device_id)
            .header(
                "User-Agent",
                format!("listbot/{}", env!("CARGO_PKG_VERSION")),
            )
            .timeout(self.timeout)
    }

    async fn send(&self, op: &'static str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| BotError::listing(op, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(op, status, body))
    }

    async fn json<T: DeserializeOwned>(&self, op: &'static str, builder: RequestBuilder) -> Result<T> {
        self.send(op, builder)
            .await?
            .json()
            .await
            .map_err(|e| BotError::listing(op, format!("invalid response: {e}")))
    }

    /// Send a versioned mutation and return the new version token.
    async fn versioned(
        &self,
        op: &'static str,
        builder: RequestBuilder,
        draft: &RemoteDraft,
    ) -> Result<String> {
        let response = self
            .send(op, builder.header("If-Match", &draft.etag))
            .await?;
        Ok(etag_of(&response).unwrap_or_else(|| draft.etag.clone()))
    }
}

/// Map a non-success status to the error callers branch on.
fn status_error(op: &'static str, status: StatusCode, body: String) -> BotError {
    match status {
        StatusCode::NOT_FOUND => BotError::Listing {
            op,
            message: format!("HTTP {status}: {body}"),
            not_found: true,
        },
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => BotError::VersionConflict { op },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BotError::Auth(format!("{op} returned HTTP {status}"))
        }
        _ => BotError::listing(op, format!("HTTP {status}: {body}")),
    }
}

fn etag_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_matches('"').to_string())
}

// -- Wire types --

#[derive(Deserialize)]
struct DraftResp {
    id: String,
    etag: String,
}

#[derive(Deserialize)]
struct PublishResp {
    listing_id: String,
}

#[derive(Deserialize)]
struct PredictionWire {
    category_id: String,
    name: String,
    #[serde(default)]
    score: f32,
}

#[derive(Deserialize)]
struct OptionWire {
    id: String,
    label: String,
}

impl From<OptionWire> for FieldOption {
    fn from(o: OptionWire) -> Self {
        FieldOption {
            id: o.id,
            label: o.label,
        }
    }
}

#[derive(Deserialize)]
struct FieldWire {
    id: String,
    label: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    options: Vec<OptionWire>,
}

#[derive(Deserialize)]
struct FieldsResp {
    #[serde(default)]
    fields: Vec<FieldWire>,
    #[serde(default)]
    shipping_allowed: bool,
    #[serde(default)]
    package_sizes: Vec<OptionWire>,
}

impl From<FieldsResp> for CategoryFields {
    fn from(r: FieldsResp) -> Self {
        CategoryFields {
            fields: r
                .fields
                .into_iter()
                .map(|f| FieldSpec {
                    id: f.id,
                    label: f.label,
                    required: f.required,
                    options: f.options.into_iter().map(Into::into).collect(),
                })
                .collect(),
            shipping_allowed: r.shipping_allowed,
            package_sizes: r.package_sizes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize)]
struct ListingWire {
    id: String,
    title: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct ListingsResp {
    items: Vec<ListingWire>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct PricesResp {
    prices: Vec<f64>,
}

#[derive(Deserialize)]
struct CategoryWire {
    id: String,
    name: String,
    parent_id: Option<String>,
}

#[derive(Deserialize)]
struct TokenResp {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl TokenResp {
    fn into_credentials(self, device_id: &str) -> Credentials {
        Credentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
            device_id: device_id.to_string(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum VerifyResp {
    Ok(TokenResp),
    SmsRequired,
}

// -- ListingService --

#[async_trait]
impl ListingService for MarketplaceClient {
    async fn create_draft(
        &self,
        auth: &Credentials,
        title: &str,
        description: &str,
    ) -> Result<RemoteDraft> {
        let body = serde_json::json!({ "title": title, "description": description });
        let builder = self.authed(self.client.post(self.url("/drafts")), auth).json(&body);
        let resp: DraftResp = self.json("create_draft", builder).await?;
        Ok(RemoteDraft {
            id: resp.id,
            etag: resp.etag,
        })
    }

    async fn upload_image(&self, auth: &Credentials, draft_id: &str, image: Vec<u8>) -> Result<()> {
        let part = reqwest::multipart::Part::bytes(image)
            .file_name("photo.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| BotError::listing("upload_image", e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("image", part);
        let url = self.url(&format!("/drafts/{draft_id}/images"));
        let builder = self.authed(self.client.post(url), auth).multipart(form);
        self.send("upload_image", builder).await?;
        Ok(())
    }

    async fn patch_fields(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        patch: &FieldPatch,
    ) -> Result<String> {
        let url = self.url(&format!("/drafts/{}", draft.id));
        let builder = self.authed(self.client.patch(url), auth).json(patch);
        self.versioned("patch_fields", builder, draft).await
    }

    async fn set_category(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        category_id: &str,
    ) -> Result<String> {
        let url = self.url(&format!("/drafts/{}/category", draft.id));
        let builder = self
            .authed(self.client.put(url), auth)
            .json(&serde_json::json!({ "category_id": category_id }));
        self.versioned("set_category", builder, draft).await
    }

    async fn get_field_options(
        &self,
        auth: &Credentials,
        category_id: &str,
    ) -> Result<CategoryFields> {
        let url = self.url(&format!("/categories/{category_id}/fields"));
        let resp: FieldsResp = self
            .json("get_field_options", self.authed(self.client.get(url), auth))
            .await?;
        Ok(resp.into())
    }

    async fn get_category_predictions(
        &self,
        auth: &Credentials,
        draft_id: &str,
    ) -> Result<Vec<CategoryPrediction>> {
        let url = self.url(&format!("/drafts/{draft_id}/category-predictions"));
        let resp: Vec<PredictionWire> = self
            .json("get_category_predictions", self.authed(self.client.get(url), auth))
            .await?;
        Ok(resp
            .into_iter()
            .map(|p| CategoryPrediction {
                category_id: p.category_id,
                name: p.name,
                score: p.score,
            })
            .collect())
    }

    async fn set_delivery_options(
        &self,
        auth: &Credentials,
        draft: &RemoteDraft,
        options: &DeliveryOptions,
    ) -> Result<String> {
        let url = self.url(&format!("/drafts/{}/delivery", draft.id));
        let builder = self.authed(self.client.put(url), auth).json(options);
        self.versioned("set_delivery_options", builder, draft).await
    }

    async fn publish(&self, auth: &Credentials, draft: &RemoteDraft) -> Result<String> {
        let url = self.url(&format!("/drafts/{}/publish", draft.id));
        let builder = self
            .authed(self.client.post(url), auth)
            .header("If-Match", &draft.etag);
        let resp: PublishResp = self.json("publish", builder).await?;
        Ok(resp.listing_id)
    }

    async fn delete_draft(&self, auth: &Credentials, draft_id: &str) -> Result<()> {
        let url = self.url(&format!("/drafts/{draft_id}"));
        self.send("delete_draft", self.authed(self.client.delete(url), auth))
            .await?;
        Ok(())
    }

    async fn list_summaries(
        &self,
        auth: &Credentials,
        cursor: Option<&str>,
    ) -> Result<Page<ListingSummary>> {
        let mut builder = self.authed(self.client.get(self.url("/listings")), auth);
        if let Some(cursor) = cursor {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let resp: ListingsResp = self.json("list_summaries", builder).await?;
        Ok(Page {
            items: resp
                .items
                .into_iter()
                .map(|l| ListingSummary {
                    id: l.id,
                    title: l.title,
                    price: l.price,
                    status: l.status,
                })
                .collect(),
            next_cursor: resp.next_cursor.filter(|c| !c.is_empty()),
        })
    }

    async fn search_prices(
        &self,
        auth: &Credentials,
        query: &str,
        category_id: Option<&str>,
    ) -> Result<Vec<f64>> {
        let mut builder = self
            .authed(self.client.get(self.url("/search/prices")), auth)
            .query(&[("q", query)]);
        if let Some(category_id) = category_id {
            builder = builder.query(&[("category_id", category_id)]);
        }
        let resp: PricesResp = self.json("search_prices", builder).await?;
        Ok(resp.prices)
    }

    async fn get_categories(&self) -> Result<Vec<CategoryEntry>> {
        let builder = self
            .client
            .get(self.url("/categories"))
            .timeout(self.timeout);
        let resp: Vec<CategoryWire> = self.json("get_categories", builder).await?;
        Ok(resp
            .into_iter()
            .map(|c| CategoryEntry {
                id: c.id,
                name: c.name,
                parent_id: c.parent_id,
            })
            .collect())
    }
}

// -- AuthService --

#[async_trait]
impl AuthService for MarketplaceClient {
    async fn request_email_code(&self, email: &str, device_id: &str) -> Result<()> {
        let body = serde_json::json!({ "email": email, "device_id": device_id });
        let builder = self
            .client
            .post(self.url("/auth/email-code"))
            .json(&body)
            .timeout(self.timeout);
        self.send("request_email_code", builder).await?;
        Ok(())
    }

    async fn verify_email_code(
        &self,
        email: &str,
        code: &str,
        device_id: &str,
    ) -> Result<LoginStep> {
        let body = serde_json::json!({ "email": email, "code": code, "device_id": device_id });
        let builder = self
            .client
            .post(self.url("/auth/email-code/verify"))
            .json(&body)
            .timeout(self.timeout);
        let resp: VerifyResp = self.json("verify_email_code", builder).await?;
        Ok(match resp {
            VerifyResp::Ok(tokens) => LoginStep::Done(tokens.into_credentials(device_id)),
            VerifyResp::SmsRequired => LoginStep::SmsRequired,
        })
    }

    async fn verify_sms_code(
        &self,
        email: &str,
        code: &str,
        device_id: &str,
    ) -> Result<Credentials> {
        let body = serde_json::json!({ "email": email, "code": code, "device_id": device_id });
        let builder = self
            .client
            .post(self.url("/auth/sms-code/verify"))
            .json(&body)
            .timeout(self.timeout);
        let tokens: TokenResp = self.json("verify_sms_code", builder).await?;
        Ok(tokens.into_credentials(device_id))
    }

    async fn refresh(&self, credentials: &Credentials) -> Result<Credentials> {
        let body = serde_json::json!({ "refresh_token": credentials.refresh_token });
        let builder = self
            .client
            .post(self.url("/auth/refresh"))
            .header("X-Device-Id", &credentials.device_id)
            .json(&body)
            .timeout(self.timeout);
        let tokens: TokenResp = self.json("refresh", builder).await?;
        Ok(tokens.into_credentials(&credentials.device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_mapping() {
        assert!(status_error("delete_draft", StatusCode::NOT_FOUND, String::new()).is_not_found());
        assert!(matches!(
            status_error("publish", StatusCode::PRECONDITION_FAILED, String::new()),
            BotError::VersionConflict { op: "publish" }
        ));
        assert!(matches!(
            status_error("patch_fields", StatusCode::CONFLICT, String::new()),
            BotError::VersionConflict { .. }
        ));
        assert!(matches!(
            status_error("list_summaries", StatusCode::UNAUTHORIZED, String::new()),
            BotError::Auth(_)
        ));
        let other = status_error("publish", StatusCode::BAD_GATEWAY, "oops".into());
        assert!(!other.is_not_found());
        assert!(other.to_string().contains("oops"));
    }

    #[test]
    fn test_verify_response_variants() {
        let sms: VerifyResp = serde_json::from_str(r#"{"status": "sms_required"}"#).unwrap();
        assert!(matches!(sms, VerifyResp::SmsRequired));

        let ok: VerifyResp = serde_json::from_str(
            r#"{"status": "ok", "access_token": "a", "refresh_token": "r", "expires_in": 3600}"#,
        )
        .unwrap();
        let VerifyResp::Ok(tokens) = ok else {
            panic!("expected tokens");
        };
        let creds = tokens.into_credentials("dev-1");
        assert_eq!(creds.access_token, "a");
        assert_eq!(creds.device_id, "dev-1");
        assert!(!creds.expires_within(chrono::Duration::minutes(30)));
        assert!(creds.expires_within(chrono::Duration::hours(2)));
    }

    #[test]
    fn test_fields_response_defaults() {
        let resp: FieldsResp = serde_json::from_str(
            r#"{"fields": [{"id": "condition", "label": "Condition", "required": true,
                 "options": [{"id": "new", "label": "New"}]}]}"#,
        )
        .unwrap();
        let fields = CategoryFields::from(resp);
        assert!(!fields.shipping_allowed);
        assert_eq!(fields.fields[0].resolve("new"), Some("new".into()));
        assert!(fields.package_sizes.is_empty());
    }
}
