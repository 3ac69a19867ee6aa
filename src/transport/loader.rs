//! Paced script loading over HTTP.

use super::scope::GlobalScope;
use crate::core::error::FetchError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_millis(7000);
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(200);

const USER_AGENT: &str = concat!("fundpulse/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub timeout: Duration,
    /// Minimum spacing between two dispatches of the same URL.
    pub min_interval: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOAD_TIMEOUT,
            min_interval: MIN_REQUEST_INTERVAL,
        }
    }
}

/// Loads remote scripts and evaluates them into a [`GlobalScope`].
pub struct ScriptLoader {
    client: reqwest::Client,
    scope: GlobalScope,
    options: LoaderOptions,
    /// Last dispatch time per URL, kept for the lifetime of the loader.
    last_dispatch: Mutex<HashMap<String, Instant>>,
    active: Arc<AtomicUsize>,
}

/// Counts a dispatch as in flight until dropped.
struct ActiveScript {
    active: Arc<AtomicUsize>,
}

impl ActiveScript {
    fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ActiveScript {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptLoader {
    pub fn new(scope: GlobalScope, options: LoaderOptions) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            scope,
            options,
            last_dispatch: Mutex::new(HashMap::new()),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn scope(&self) -> &GlobalScope {
        &self.scope
    }

    pub fn default_timeout(&self) -> Duration {
        self.options.timeout
    }

    /// Number of dispatches that have not settled yet.
    pub fn in_flight(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn load_script(&self, url: &str) -> Result<(), FetchError> {
        self.load_script_with_timeout(url, self.options.timeout)
            .await
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn load_script_with_timeout(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let body = self.dispatch(url, timeout).await?;
        self.scope.evaluate(&body);
        Ok(())
    }

    /// Loads a script into a fresh scope owned by the caller, for payloads whose
    /// variable names are unique to the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_isolated(&self, url: &str) -> Result<GlobalScope, FetchError> {
        let body = self.dispatch(url, self.options.timeout).await?;
        let scope = GlobalScope::new();
        scope.evaluate(&body);
        Ok(scope)
    }

    /// Loads a script that answers by calling `callback`, returning the raw
    /// argument text of that call.
    #[instrument(skip(self), level = "debug")]
    pub async fn load_jsonp(
        &self,
        url: &str,
        callback: &str,
        timeout: Duration,
    ) -> Result<String, FetchError> {
        let mut registration = self.scope.register_callback(callback);
        let body = self.dispatch(url, timeout).await?;
        self.scope.evaluate(&body);
        registration.try_take().ok_or_else(|| {
            warn!(url, callback, "Script did not invoke its callback");
            FetchError::load_error(url, format!("callback {callback} was not invoked"))
        })
    }

    async fn dispatch(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(FetchError::NoRuntimeEnvironment {
                url: url.to_string(),
            });
        }

        self.wait_for_slot(url).await;

        let _active = ActiveScript::new(&self.active);
        match tokio::time::timeout(timeout, self.fetch_body(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url, timeout_ms = timeout.as_millis() as u64, "Script load timed out");
                Err(FetchError::LoadTimeout {
                    url: url.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Delays until `url` has not been dispatched for at least the minimum
    /// interval, then records the new dispatch time.
    async fn wait_for_slot(&self, url: &str) {
        loop {
            let wait = {
                let mut last_dispatch = self
                    .last_dispatch
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let now = Instant::now();
                match last_dispatch.get(url) {
                    Some(last) if now.duration_since(*last) < self.options.min_interval => {
                        self.options.min_interval - now.duration_since(*last)
                    }
                    _ => {
                        last_dispatch.insert(url.to_string(), now);
                        return;
                    }
                }
            };
            debug!(url, wait_ms = wait.as_millis() as u64, "Pacing repeated request");
            tokio::time::sleep(wait).await;
        }
    }

    async fn fetch_body(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "Dispatching script request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::load_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::load_error(url, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::load_error(url, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader() -> ScriptLoader {
        ScriptLoader::new(GlobalScope::new(), LoaderOptions::default()).unwrap()
    }

    #[tokio::test]
    async fn test_load_script_evaluates_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/q"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"v_jj000001="1~FundX";"#))
            .mount(&mock_server)
            .await;

        let loader = loader();
        loader
            .load_script(&format!("{}/q", mock_server.uri()))
            .await
            .unwrap();
        assert_eq!(loader.scope().var("v_jj000001").as_deref(), Some(r#""1~FundX""#));
        assert_eq!(loader.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_repeated_url_is_paced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/paced"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var a = 1;"))
            .expect(2)
            .mount(&mock_server)
            .await;

        let loader = loader();
        let url = format!("{}/paced", mock_server.uri());
        let started = Instant::now();
        let (first, second) = tokio::join!(loader.load_script(&url), loader.load_script(&url));
        first.unwrap();
        second.unwrap();
        assert!(started.elapsed() >= MIN_REQUEST_INTERVAL);
    }

    #[tokio::test]
    async fn test_distinct_urls_are_not_paced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var a = 1;"))
            .mount(&mock_server)
            .await;

        let loader = loader();
        let started = Instant::now();
        loader
            .load_script(&format!("{}/a", mock_server.uri()))
            .await
            .unwrap();
        loader
            .load_script(&format!("{}/b", mock_server.uri()))
            .await
            .unwrap();
        assert!(started.elapsed() < MIN_REQUEST_INTERVAL);
    }

    #[tokio::test]
    async fn test_timeout_releases_active_script() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("jsonpgz({});")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let loader = loader();
        let err = loader
            .load_jsonp(
                &format!("{}/slow", mock_server.uri()),
                "jsonpgz",
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(loader.in_flight(), 0);
        assert!(!loader.scope().has_callback("jsonpgz"));
    }

    #[tokio::test]
    async fn test_http_failure_is_load_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let loader = loader();
        let err = loader
            .load_script(&format!("{}/broken", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::LoadError { .. }));
    }

    #[tokio::test]
    async fn test_jsonp_without_callback_is_load_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("var other = 1;"))
            .mount(&mock_server)
            .await;

        let loader = loader();
        let err = loader
            .load_jsonp(
                &format!("{}/jsonp", mock_server.uri()),
                "cb_1",
                DEFAULT_LOAD_TIMEOUT,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::LoadError { .. }));
        assert!(!loader.scope().has_callback("cb_1"));
    }

    #[tokio::test]
    async fn test_jsonp_returns_callback_arguments() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"cb_2({"Datas":[]});"#),
            )
            .mount(&mock_server)
            .await;

        let loader = loader();
        let payload = loader
            .load_jsonp(
                &format!("{}/jsonp", mock_server.uri()),
                "cb_2",
                DEFAULT_LOAD_TIMEOUT,
            )
            .await
            .unwrap();
        assert_eq!(payload, r#"{"Datas":[]}"#);
    }

    #[test]
    fn test_no_runtime_environment() {
        let loader = loader();
        let result = futures::executor::block_on(loader.load_script("http://127.0.0.1:9/x.js"));
        assert!(matches!(
            result,
            Err(FetchError::NoRuntimeEnvironment { .. })
        ));
        assert_eq!(loader.in_flight(), 0);
    }
}
