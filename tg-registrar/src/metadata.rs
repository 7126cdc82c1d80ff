//! Instance metadata: the instance's own id and the spot termination notice.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::imds;

use crate::error::MetadataError;
use crate::membership::InstanceId;

const INSTANCE_ID_PATH: &str = "/latest/meta-data/instance-id";

#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Resolve the id of the instance we are running on.
    async fn instance_id(&self) -> Result<InstanceId, MetadataError>;

    /// Whether the metadata service answers at all.
    async fn is_available(&self) -> bool {
        self.instance_id().await.is_ok()
    }

    /// Poll the termination notice endpoint once. `Ok(true)` means a notice is present.
    async fn termination_notice(&self) -> Result<bool, MetadataError>;
}

#[async_trait]
impl<T: MetadataSource + ?Sized> MetadataSource for Arc<T> {
    async fn instance_id(&self) -> Result<InstanceId, MetadataError> {
        (**self).instance_id().await
    }

    async fn is_available(&self) -> bool {
        (**self).is_available().await
    }

    async fn termination_notice(&self) -> Result<bool, MetadataError> {
        (**self).termination_notice().await
    }
}

/// Plain HTTP GET against the notice endpoint. Any 2xx status means the notice is present.
///
/// The endpoint is read without an IMDSv2 session token, so the instance's
/// `MetadataOptions.HttpTokens` must be `optional` for the notice to be visible.
#[derive(Debug, Clone)]
pub struct NoticeProbe {
    client: reqwest::Client,
    url: String,
}

impl NoticeProbe {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .user_agent("tg-registrar")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn check(&self) -> Result<bool, MetadataError> {
        let response = self.client.get(&self.url).send().await?;

        Ok(response.status().is_success())
    }
}

/// EC2 instance metadata, backed by the SDK's IMDS client.
pub struct Ec2Metadata {
    imds: imds::Client,
    notice: NoticeProbe,
}

impl Ec2Metadata {
    pub fn new(imds: imds::Client, notice: NoticeProbe) -> Self {
        Self { imds, notice }
    }
}

#[async_trait]
impl MetadataSource for Ec2Metadata {
    async fn instance_id(&self) -> Result<InstanceId, MetadataError> {
        let value = self
            .imds
            .get(INSTANCE_ID_PATH)
            .await
            .map_err(|e| MetadataError::Imds(e.to_string()))?;
        let id: &str = value.as_ref();

        match id.trim() {
            "" => Err(MetadataError::Imds("empty instance id".to_string())),
            id => Ok(InstanceId::new(id)),
        }
    }

    async fn termination_notice(&self) -> Result<bool, MetadataError> {
        self.notice.check().await
    }
}

/// What a [`MockMetadataSource`] answers to a single notice poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeResponse {
    Absent,
    Present,
    TransportError,
}

type NoticeScript = Arc<dyn Fn(usize) -> NoticeResponse + Send + Sync>;

/// Mock metadata source for testing - always available, no conditional compilation needed.
///
/// Notice polls are answered by a script keyed on the zero-based poll number. Clones share the
/// poll counter.
#[derive(Clone)]
pub struct MockMetadataSource {
    instance_id: Option<InstanceId>,
    available: bool,
    notice: NoticeScript,
    polls: Arc<AtomicUsize>,
}

impl MockMetadataSource {
    /// Available, resolves `instance_id`, never reports a notice.
    pub fn new(instance_id: &str) -> Self {
        Self {
            instance_id: Some(InstanceId::new(instance_id)),
            available: true,
            notice: Arc::new(|_| NoticeResponse::Absent),
            polls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Metadata service that cannot be reached.
    pub fn unavailable() -> Self {
        Self {
            instance_id: None,
            available: false,
            ..Self::new("")
        }
    }

    pub fn with_notice(
        mut self,
        script: impl Fn(usize) -> NoticeResponse + Send + Sync + 'static,
    ) -> Self {
        self.notice = Arc::new(script);
        self
    }

    /// Number of notice polls answered so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for MockMetadataSource {
    async fn instance_id(&self) -> Result<InstanceId, MetadataError> {
        self.instance_id
            .clone()
            .ok_or_else(|| MetadataError::Imds("metadata service unreachable".to_string()))
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn termination_notice(&self) -> Result<bool, MetadataError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        match (self.notice)(poll) {
            NoticeResponse::Absent => Ok(false),
            NoticeResponse::Present => Ok(true),
            NoticeResponse::TransportError => {
                Err(MetadataError::Imds("connection refused".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    const NOTICE_PATH: &str = "/latest/meta-data/spot/termination-time";

    #[tokio::test]
    async fn test_notice_present_on_200() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path(NOTICE_PATH);
                then.status(200).body("2026-10-19T12:00:00Z");
            })
            .await;

        let probe = NoticeProbe::new(server.url(NOTICE_PATH), Duration::from_secs(1)).unwrap();

        assert!(probe.check().await.unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_notice_absent_on_404() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(NOTICE_PATH);
                then.status(404);
            })
            .await;

        let probe = NoticeProbe::new(server.url(NOTICE_PATH), Duration::from_secs(1)).unwrap();

        assert!(!probe.check().await.unwrap());
    }

    #[tokio::test]
    async fn test_notice_transport_error() {
        // Nothing listens on port 9 locally.
        let probe = NoticeProbe::new("http://127.0.0.1:9/notice", Duration::from_secs(1)).unwrap();

        assert!(matches!(
            probe.check().await,
            Err(MetadataError::Request(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_source_script_and_poll_count() {
        let source = MockMetadataSource::new("i-abc").with_notice(|poll| match poll {
            0 => NoticeResponse::TransportError,
            1 => NoticeResponse::Absent,
            _ => NoticeResponse::Present,
        });

        assert_eq!(source.instance_id().await.unwrap(), InstanceId::new("i-abc"));
        assert!(source.is_available().await);
        assert!(source.termination_notice().await.is_err());
        assert!(!source.termination_notice().await.unwrap());
        assert!(source.termination_notice().await.unwrap());
        assert_eq!(source.polls(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_mock() {
        let source = MockMetadataSource::unavailable();

        assert!(!source.is_available().await);
        assert!(matches!(
            source.instance_id().await,
            Err(MetadataError::Imds(_))
        ));
    }
}
