//! HTTP backend for the server's JSON API.
//!
//! Methods live at `<api_url>/<namespace>/<method>`. Read-only methods are
//! called with GET and query parameters, everything else with POST and a JSON
//! body. Every answer is wrapped in an envelope:
//!
//! ```json
//! {"success": true, "result": [ ... ]}
//! {"success": false, "message": "No such system - sid = 42"}
//! ```
//!
//! The session travels in the `pxt-session-cookie` cookie set by `auth/login`.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::method::Method;
use crate::types::{
    ActionId, ActionSystem, AdvisoryType, Credentials, Erratum, GroupMember, InstalledProduct,
    MigrationTarget, ProvisionOptions, ProxyHop, ScheduledAction, ScriptRun, SessionKey,
    SystemId, SystemRecord, format_server_time,
};
use base64::Engine;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Name of the cookie carrying the session.
const SESSION_COOKIE: &str = "pxt-session-cookie";

/// Default timeout for one request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Base URL, e.g. `https://suma.example.com/rhn/manager/api`.
    pub api_url: String,
    /// Verify the server certificate.
    pub verify_tls: bool,
    /// Timeout for one request.
    pub timeout: Duration,
}

impl HttpSettings {
    /// Settings with certificate verification on and the default timeout.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            verify_tls: true,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Backend talking to a real server over HTTPS.
pub struct HttpBackend {
    /// HTTP agent for requests.
    agent: ureq::Agent,
    /// API base URL without trailing slash.
    api_url: String,
}

impl HttpBackend {
    /// Create a backend from connection settings.
    #[must_use]
    pub fn new(settings: &HttpSettings) -> Self {
        let tls = ureq::tls::TlsConfig::builder()
            .disable_verification(!settings.verify_tls)
            .build();
        let config = ureq::Agent::config_builder()
            .tls_config(tls)
            .timeout_global(Some(settings.timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the API base URL.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Build the URL for a method.
    fn url(&self, method: Method) -> String {
        format!("{}/{}", self.api_url, method.path())
    }

    fn get<T: DeserializeOwned>(
        &self,
        method: Method,
        key: &SessionKey,
        params: &[(&str, String)],
    ) -> Result<T> {
        log::trace!("GET {method} {params:?}");
        let mut request = self
            .agent
            .get(&self.url(method))
            .header("Cookie", &cookie(key))
            .header("Accept", "application/json");
        for (name, value) in params {
            request = request.query(*name, value);
        }
        let mut response = request.call()?;
        decode(method, &mut response)
    }

    fn post<T: DeserializeOwned>(&self, method: Method, key: &SessionKey, body: &Value) -> Result<T> {
        log::trace!("POST {method}");
        let mut response = self
            .agent
            .post(&self.url(method))
            .header("Cookie", &cookie(key))
            .header("Accept", "application/json")
            .send_json(body)?;
        decode(method, &mut response)
    }
}

fn cookie(key: &SessionKey) -> String {
    format!("{SESSION_COOKIE}={}", key.as_str())
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    message: Option<String>,
}

/// Unwrap the response envelope into the method's result type.
fn decode<T: DeserializeOwned>(
    method: Method,
    response: &mut ureq::http::Response<ureq::Body>,
) -> Result<T> {
    let status = response.status().as_u16();
    let envelope: Envelope = match response.body_mut().read_json() {
        Ok(envelope) => envelope,
        Err(_) if status >= 400 => {
            return Err(Error::fault(method.name(), i32::from(status), format!("HTTP {status}")));
        }
        Err(e) => return Err(Error::invalid_response(method.name(), e.to_string())),
    };
    if !envelope.success {
        let message = envelope
            .message
            .unwrap_or_else(|| format!("HTTP {status}"));
        return Err(Error::fault(method.name(), i32::from(status), message));
    }
    serde_json::from_value(envelope.result)
        .map_err(|e| Error::invalid_response(method.name(), e.to_string()))
}

/// Pick the live session token out of `Set-Cookie` headers.
///
/// The server may send an expired cookie of the same name alongside the
/// real one; expired or empty values are ignored and the last live one wins.
fn session_from_cookies<'a>(headers: impl Iterator<Item = &'a str>) -> Option<String> {
    headers
        .filter_map(|header| {
            let mut parts = header.split(';');
            let (name, value) = parts.next()?.trim().split_once('=')?;
            if name != SESSION_COOKIE || value.is_empty() {
                return None;
            }
            let expired = parts.any(|attr| attr.trim().eq_ignore_ascii_case("Max-Age=0"));
            (!expired).then(|| value.to_string())
        })
        .last()
}

/// Parameters of `system.scheduleProductMigration`.
///
/// The server picks the overload by parameter names: `baseChannelLabel` is
/// always sent, `targetIdent` only when the operator pinned a target.
fn migration_body(
    sid: SystemId,
    base_channel: &str,
    target_ident: Option<&str>,
    dry_run: bool,
    time: &NaiveDateTime,
) -> Value {
    let mut body = json!({
        "sid": sid,
        "baseChannelLabel": base_channel,
        "optionalChildChannels": [],
        "dryRun": dry_run,
        "earliest": format_server_time(time),
    });
    if let Some(ident) = target_ident {
        body["targetIdent"] = json!(ident);
    }
    body
}

fn script_run_body(sid: SystemId, label: &str, script: &ScriptRun) -> Value {
    json!({
        "sid": sid,
        "chainLabel": label,
        "uid": script.uid,
        "gid": script.gid,
        "timeout": script.timeout,
        "scriptBody": base64::engine::general_purpose::STANDARD.encode(&script.body),
    })
}

impl Backend for HttpBackend {
    fn login(&self, credentials: &Credentials) -> Result<SessionKey> {
        let method = Method::AuthLogin;
        let mut response = self
            .agent
            .post(&self.url(method))
            .header("Accept", "application/json")
            .send_json(json!({
                "login": credentials.username,
                "password": credentials.password,
            }))?;

        let token = session_from_cookies(
            response
                .headers()
                .get_all("set-cookie")
                .iter()
                .filter_map(|v| v.to_str().ok()),
        );
        let _: Value = decode(method, &mut response)?;

        token.map(SessionKey::new).ok_or_else(|| {
            Error::invalid_response(method.name(), "login succeeded but no session cookie was set")
        })
    }

    fn logout(&self, key: &SessionKey) -> Result<()> {
        let _: Value = self.post(Method::AuthLogout, key, &json!({}))?;
        Ok(())
    }

    fn list_assignable_roles(&self, key: &SessionKey) -> Result<Vec<String>> {
        self.get(Method::UserListAssignableRoles, key, &[])
    }

    fn get_system_id(&self, key: &SessionKey, name: &str) -> Result<Vec<SystemRecord>> {
        self.get(Method::SystemGetId, key, &[("name", name.to_string())])
    }

    fn list_group_systems(&self, key: &SessionKey, group: &str) -> Result<Vec<GroupMember>> {
        self.get(
            Method::SystemGroupListSystems,
            key,
            &[("systemGroupName", group.to_string())],
        )
    }

    fn get_relevant_errata(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<Erratum>> {
        self.get(Method::SystemGetRelevantErrata, key, &[("sid", sid.to_string())])
    }

    fn get_relevant_errata_by_type(
        &self,
        key: &SessionKey,
        sid: SystemId,
        advisory_type: AdvisoryType,
    ) -> Result<Vec<Erratum>> {
        self.get(
            Method::SystemGetRelevantErrataByType,
            key,
            &[
                ("sid", sid.to_string()),
                ("advisoryType", advisory_type.label().to_string()),
            ],
        )
    }

    fn list_errata_keywords(&self, key: &SessionKey, advisory_name: &str) -> Result<Vec<String>> {
        self.get(
            Method::ErrataListKeywords,
            key,
            &[("advisoryName", advisory_name.to_string())],
        )
    }

    fn get_installed_products(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<InstalledProduct>> {
        self.get(Method::SystemGetInstalledProducts, key, &[("sid", sid.to_string())])
    }

    fn get_connection_path(&self, key: &SessionKey, sid: SystemId) -> Result<Vec<ProxyHop>> {
        self.get(Method::SystemGetConnectionPath, key, &[("sid", sid.to_string())])
    }

    fn list_migration_targets(
        &self,
        key: &SessionKey,
        sid: SystemId,
    ) -> Result<Vec<MigrationTarget>> {
        self.get(Method::SystemListMigrationTargets, key, &[("sid", sid.to_string())])
    }

    fn list_in_progress_actions(&self, key: &SessionKey) -> Result<Vec<ScheduledAction>> {
        self.get(Method::ScheduleListInProgressActions, key, &[])
    }

    fn list_in_progress_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.get(
            Method::ScheduleListInProgressSystems,
            key,
            &[("actionId", action.to_string())],
        )
    }

    fn list_completed_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.get(
            Method::ScheduleListCompletedSystems,
            key,
            &[("actionId", action.to_string())],
        )
    }

    fn list_failed_systems(
        &self,
        key: &SessionKey,
        action: ActionId,
    ) -> Result<Vec<ActionSystem>> {
        self.get(
            Method::ScheduleListFailedSystems,
            key,
            &[("actionId", action.to_string())],
        )
    }

    fn create_chain(&self, key: &SessionKey, label: &str) -> Result<i64> {
        self.post(
            Method::ActionChainCreateChain,
            key,
            &json!({ "chainLabel": label }),
        )
    }

    fn add_errata_update(
        &self,
        key: &SessionKey,
        sid: SystemId,
        errata_ids: &[i64],
        label: &str,
    ) -> Result<ActionId> {
        self.post(
            Method::ActionChainAddErrataUpdate,
            key,
            &json!({ "sid": sid, "errataIds": errata_ids, "chainLabel": label }),
        )
    }

    fn add_system_reboot(&self, key: &SessionKey, sid: SystemId, label: &str) -> Result<ActionId> {
        self.post(
            Method::ActionChainAddSystemReboot,
            key,
            &json!({ "sid": sid, "chainLabel": label }),
        )
    }

    fn add_script_run(
        &self,
        key: &SessionKey,
        sid: SystemId,
        label: &str,
        script: &ScriptRun,
    ) -> Result<ActionId> {
        self.post(
            Method::ActionChainAddScriptRun,
            key,
            &script_run_body(sid, label, script),
        )
    }

    fn schedule_chain(&self, key: &SessionKey, label: &str, time: &NaiveDateTime) -> Result<i64> {
        self.post(
            Method::ActionChainScheduleChain,
            key,
            &json!({ "chainLabel": label, "date": format_server_time(time) }),
        )
    }

    fn schedule_product_migration(
        &self,
        key: &SessionKey,
        sid: SystemId,
        base_channel: &str,
        target_ident: Option<&str>,
        dry_run: bool,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.post(
            Method::SystemScheduleProductMigration,
            key,
            &migration_body(sid, base_channel, target_ident, dry_run, time),
        )
    }

    fn provision_system(
        &self,
        key: &SessionKey,
        sid: SystemId,
        proxy: Option<SystemId>,
        profile: &str,
        time: &NaiveDateTime,
        options: &ProvisionOptions,
    ) -> Result<ActionId> {
        let mut body = json!({
            "sid": sid,
            "profileName": profile,
            "earliestDate": format_server_time(time),
            "advancedOptions": options,
        });
        if let Some(proxy) = proxy {
            body["proxy"] = json!(proxy);
        }
        self.post(Method::SystemProvisionSystem, key, &body)
    }

    fn schedule_package_refresh(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.post(
            Method::SystemSchedulePackageRefresh,
            key,
            &json!({ "sid": sid, "earliestOccurrence": format_server_time(time) }),
        )
    }

    fn schedule_reboot(
        &self,
        key: &SessionKey,
        sid: SystemId,
        time: &NaiveDateTime,
    ) -> Result<ActionId> {
        self.post(
            Method::SystemScheduleReboot,
            key,
            &json!({ "sid": sid, "earliestOccurrence": format_server_time(time) }),
        )
    }
}
