// src/storage/s3.rs
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

use super::{BucketStatus, StorageBackend};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::table::TableLocation;

const DEFAULT_REGION: &str = "us-east-1";

/// Connector for S3 and S3-compatible stores such as MinIO.
///
/// Bucket management goes through the AWS SDK; object I/O and Delta access go
/// through `object_store` with the same endpoint and credentials.
pub struct S3Storage {
    client: Client,
    config: StoreConfig,
}

impl fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Storage")
            .field("endpoint", &self.config.endpoint)
            .field("region", &self.config.region)
            .field("bucket", &self.config.bucket)
            .finish_non_exhaustive()
    }
}

impl S3Storage {
    /// Build the client and verify the endpoint and credentials with one
    /// `ListBuckets` round-trip.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(endpoint = %config.endpoint, "Initializing S3 client");
        let storage = Self {
            client: build_client(config).await,
            config: config.clone(),
        };

        match storage.list_buckets().await {
            Ok(buckets) => {
                tracing::info!(buckets = buckets.len(), "Successfully connected to S3");
            }
            // Authenticated but not allowed to list; bucket-level calls may still work
            Err(Error::Permission(message)) => {
                tracing::warn!(%message, "Connected to S3 without ListBuckets permission");
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to S3");
                return Err(e);
            }
        }

        Ok(storage)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<BucketStatus> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if self.config.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(
                        self.config.region.as_str(),
                    ))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                tracing::info!(bucket, "Bucket created");
                Ok(BucketStatus::Created)
            }
            Err(err) if is_already_owned(&err) => {
                tracing::info!(bucket, "Bucket already exists");
                Ok(BucketStatus::AlreadyExists)
            }
            Err(err) => Err(classify("CreateBucket", err, Error::Write)),
        }
    }
}

async fn build_client(config: &StoreConfig) -> Client {
    let credentials = Credentials::new(
        config.access_key.clone(),
        config.secret_key.clone(),
        None,
        None,
        "static",
    );

    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .endpoint_url(&config.endpoint)
        .credentials_provider(credentials)
        .region(Region::new(config.region.clone()))
        .load()
        .await;

    // MinIO only supports path-style addressing
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();

    Client::from_conf(s3_config)
}

/// Map an SDK failure onto the error taxonomy. Transport failures and
/// rejected credentials are connection errors; 403s are permission errors;
/// anything else falls back to `other`.
fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>, other: fn(String) -> Error) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{}: {}", operation, DisplayErrorContext(&err));

    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            match service.err().code() {
                Some("InvalidAccessKeyId" | "SignatureDoesNotMatch" | "InvalidToken") => {
                    Error::Connection(message)
                }
                Some("AccessDenied" | "AllAccessDisabled" | "BucketAlreadyExists") => {
                    Error::Permission(message)
                }
                _ if status == 403 => Error::Permission(message),
                _ => other(message),
            }
        }
        _ => Error::Connection(message),
    }
}

fn is_already_owned(err: &SdkError<CreateBucketError, HttpResponse>) -> bool {
    err.as_service_error()
        .map(|e| e.is_bucket_already_owned_by_you())
        .unwrap_or(false)
}

fn is_not_found<E>(err: &SdkError<E, HttpResponse>) -> bool {
    match err {
        SdkError::ServiceError(service) => service.raw().status().as_u16() == 404,
        _ => false,
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn ensure_bucket(&self, bucket: &str) -> Result<BucketStatus> {
        let result = match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => {
                tracing::info!(bucket, "Bucket already exists");
                Ok(BucketStatus::AlreadyExists)
            }
            Err(err) if is_not_found(&err) => self.create_bucket(bucket).await,
            Err(err) => Err(classify("HeadBucket", err, Error::Connection)),
        };

        if let Err(e) = &result {
            tracing::error!(bucket, error = %e, "Failed to check/create bucket");
        }
        result
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found(&err) => Ok(false),
            Err(err) => Err(classify("HeadBucket", err, Error::Connection)),
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| classify("ListBuckets", err, Error::Connection))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .map(String::from)
            .collect())
    }

    fn table_url(&self, location: &TableLocation) -> Result<Url> {
        let url = format!("s3://{}/{}", location.bucket(), location.prefix());
        Url::parse(&url).map_err(|e| Error::InvalidArgument(format!("{}: {}", url, e)))
    }

    fn storage_options(&self) -> HashMap<String, String> {
        HashMap::from([
            ("AWS_ENDPOINT_URL".to_string(), self.config.endpoint.clone()),
            ("AWS_ACCESS_KEY_ID".to_string(), self.config.access_key.clone()),
            (
                "AWS_SECRET_ACCESS_KEY".to_string(),
                self.config.secret_key.clone(),
            ),
            ("AWS_REGION".to_string(), self.config.region.clone()),
            (
                "AWS_ALLOW_HTTP".to_string(),
                self.config.allow_http().to_string(),
            ),
            (
                "AWS_VIRTUAL_HOSTED_STYLE_REQUEST".to_string(),
                "false".to_string(),
            ),
            // No locking provider is configured, so commits use plain rename
            ("AWS_S3_ALLOW_UNSAFE_RENAME".to_string(), "true".to_string()),
        ])
    }

    fn object_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_endpoint(&self.config.endpoint)
            .with_access_key_id(&self.config.access_key)
            .with_secret_access_key(&self.config.secret_key)
            .with_region(&self.config.region)
            .with_allow_http(self.config.allow_http())
            .with_virtual_hosted_style_request(false)
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::head_bucket::HeadBucketError;
    use aws_sdk_s3::primitives::SdkBody;
    use aws_sdk_s3::types::error::BucketAlreadyOwnedByYou;

    fn service_error<E>(err: E, status: u16) -> SdkError<E, HttpResponse> {
        let raw = HttpResponse::new(status.try_into().unwrap(), SdkBody::empty());
        SdkError::service_error(err, raw)
    }

    fn head_bucket_error(code: Option<&str>, status: u16) -> SdkError<HeadBucketError, HttpResponse> {
        let mut meta = ErrorMetadata::builder().message("rejected");
        if let Some(code) = code {
            meta = meta.code(code);
        }
        service_error(HeadBucketError::generic(meta.build()), status)
    }

    async fn storage(endpoint: &str, region: &str) -> S3Storage {
        let config =
            StoreConfig::new(endpoint, "minioadmin", "minioadmin", "lake").with_region(region);
        S3Storage {
            client: build_client(&config).await,
            config,
        }
    }

    #[tokio::test]
    async fn test_table_url_format() {
        let storage = storage("http://localhost:9000", "us-east-1").await;
        let location = TableLocation::new("lake", "events/daily").unwrap();

        let url = storage.table_url(&location).unwrap();
        assert_eq!(url.as_str(), "s3://lake/events/daily");
    }

    #[tokio::test]
    async fn test_storage_options_for_minio() {
        let storage = storage("http://localhost:9000", "eu-west-1").await;
        let options = storage.storage_options();

        assert_eq!(options["AWS_ENDPOINT_URL"], "http://localhost:9000");
        assert_eq!(options["AWS_REGION"], "eu-west-1");
        assert_eq!(options["AWS_ALLOW_HTTP"], "true");
        assert_eq!(options["AWS_S3_ALLOW_UNSAFE_RENAME"], "true");
    }

    #[tokio::test]
    async fn test_object_store_builds_without_network() {
        let storage = storage("http://localhost:9000", "us-east-1").await;
        assert!(storage.object_store("lake").is_ok());
    }

    #[tokio::test]
    async fn test_debug_hides_credentials() {
        let storage = storage("http://localhost:9000", "us-east-1").await;
        let debug = format!("{:?}", storage);
        assert!(debug.contains("localhost:9000"));
        assert!(!debug.contains("minioadmin"));
    }

    #[tokio::test]
    async fn test_connect_unreachable_endpoint() {
        // Port 1 is never listening
        let config = StoreConfig::new("http://127.0.0.1:1", "key", "secret", "lake");
        let err = S3Storage::connect(&config).await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let config = StoreConfig::new("localhost:9000", "key", "secret", "lake");
        assert!(matches!(
            S3Storage::connect(&config).await,
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_classify_rejected_credentials_as_connection() {
        for code in ["InvalidAccessKeyId", "SignatureDoesNotMatch", "InvalidToken"] {
            let err = classify("ListBuckets", head_bucket_error(Some(code), 403), Error::Read);
            assert!(err.is_connection(), "{} gave {}", code, err);
        }
    }

    #[test]
    fn test_classify_forbidden_as_permission() {
        let err = classify("HeadBucket", head_bucket_error(Some("AccessDenied"), 403), Error::Read);
        assert!(err.is_permission(), "unexpected error: {}", err);

        // HEAD responses carry no body, so only the status is known
        let err = classify("HeadBucket", head_bucket_error(None, 403), Error::Read);
        assert!(err.is_permission(), "unexpected error: {}", err);

        let err = classify(
            "CreateBucket",
            head_bucket_error(Some("BucketAlreadyExists"), 409),
            Error::Write,
        );
        assert!(err.is_permission(), "unexpected error: {}", err);
    }

    #[test]
    fn test_classify_other_service_errors_use_fallback() {
        let err = classify("CreateBucket", head_bucket_error(Some("InternalError"), 500), Error::Write);
        assert!(matches!(err, Error::Write(_)), "unexpected error: {}", err);
        assert!(err.to_string().contains("CreateBucket"));
    }

    #[test]
    fn test_classify_transport_failure_as_connection() {
        let err: SdkError<HeadBucketError, HttpResponse> = SdkError::timeout_error("timed out");
        assert!(classify("HeadBucket", err, Error::Read).is_connection());
    }

    #[test]
    fn test_bucket_owned_by_us_is_recognised() {
        let owned = service_error(
            CreateBucketError::BucketAlreadyOwnedByYou(BucketAlreadyOwnedByYou::builder().build()),
            409,
        );
        assert!(is_already_owned(&owned));

        let other = service_error(
            CreateBucketError::generic(ErrorMetadata::builder().code("BucketAlreadyExists").build()),
            409,
        );
        assert!(!is_already_owned(&other));
    }

    #[test]
    fn test_not_found_is_status_404() {
        assert!(is_not_found(&head_bucket_error(None, 404)));
        assert!(!is_not_found(&head_bucket_error(None, 403)));
    }
}
