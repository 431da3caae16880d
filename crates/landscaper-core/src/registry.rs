// Copyright (c) Contributors to the SPK project.
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the OCI distribution API.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::oci::{DOCKER_MANIFEST_MEDIA_TYPE, OCI_MANIFEST_MEDIA_TYPE, OciClient, OciReference};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./registry_test.rs"]
mod registry_test;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json";

#[derive(Debug, Clone, Default)]
pub struct RegistryOptions {
    /// Talk plain HTTP instead of HTTPS.
    pub allow_plain_http: bool,
    /// Directory for a content addressed blob cache.
    pub cache_dir: Option<PathBuf>,
    /// `Basic` credentials per registry host, already base64 encoded.
    pub credentials: HashMap<String, String>,
}

#[derive(Deserialize)]
struct DockerConfig {
    #[serde(default)]
    auths: HashMap<String, DockerAuth>,
}

#[derive(Deserialize)]
struct DockerAuth {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Read basic credentials from a docker `config.json`.
pub fn load_docker_credentials(path: &Path) -> Result<HashMap<String, String>> {
    let data = std::fs::read(path).map_err(|error| Error::ReadFailed {
        path: path.to_path_buf(),
        error,
    })?;
    let config: DockerConfig = serde_json::from_slice(&data).map_err(|e| Error::InvalidConfig {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut out = HashMap::new();
    for (host, auth) in config.auths {
        let host = host
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        let encoded = match (auth.auth, auth.username, auth.password) {
            (Some(auth), _, _) if !auth.is_empty() => auth,
            (_, Some(user), Some(pass)) => BASE64.encode(format!("{user}:{pass}")),
            _ => continue,
        };
        out.insert(host, encoded);
    }
    Ok(out)
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Blocking registry client.
///
/// Requests are sent anonymously or with basic credentials. A `401` with a
/// `Bearer` challenge is answered by fetching a token from the announced
/// realm and retrying once; tokens are remembered per repository.
pub struct RegistryClient {
    agent: ureq::Agent,
    options: RegistryOptions,
    tokens: Mutex<HashMap<String, String>>,
}

impl RegistryClient {
    pub fn new(options: RegistryOptions) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            options,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn url(&self, reference: &OciReference, kind: &str, id: &str) -> String {
        let scheme = if self.options.allow_plain_http {
            "http"
        } else {
            "https"
        };
        format!(
            "{scheme}://{}/v2/{}/{kind}/{id}",
            reference.registry, reference.repository
        )
    }

    fn cached_token(&self, repository_key: &str) -> Option<String> {
        self.tokens
            .lock()
            .ok()
            .and_then(|t| t.get(repository_key).cloned())
    }

    fn authorization(&self, reference: &OciReference) -> Option<String> {
        let key = format!("{}/{}", reference.registry, reference.repository);
        if let Some(token) = self.cached_token(&key) {
            return Some(format!("Bearer {token}"));
        }
        self.options
            .credentials
            .get(&reference.registry)
            .map(|basic| format!("Basic {basic}"))
    }

    fn send(
        &self,
        reference: &OciReference,
        url: &str,
        accept: Option<&str>,
    ) -> Result<ureq::http::Response<ureq::Body>> {
        let mut retried = false;
        loop {
            let mut req = self.agent.get(url);
            if let Some(accept) = accept {
                req = req.header("Accept", accept);
            }
            if let Some(auth) = self.authorization(reference) {
                req = req.header("Authorization", &auth);
            }
            tracing::debug!("GET {url}");
            let resp = req.call().map_err(|e| self.err(reference, e.to_string()))?;

            if resp.status().as_u16() == 401 && !retried {
                let challenge = resp
                    .headers()
                    .get("www-authenticate")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                if let Some(challenge) = challenge {
                    self.authenticate(reference, &challenge)?;
                    retried = true;
                    continue;
                }
            }
            return Ok(resp);
        }
    }

    /// Answer a `Bearer realm=…,service=…,scope=…` challenge.
    fn authenticate(&self, reference: &OciReference, challenge: &str) -> Result<()> {
        let Some(params) = challenge.strip_prefix("Bearer ") else {
            return Err(self.err(reference, format!("unsupported auth challenge '{challenge}'")));
        };
        let params = parse_challenge(params);
        let realm = params
            .get("realm")
            .ok_or_else(|| self.err(reference, "auth challenge without realm".to_string()))?;

        let mut req = self.agent.get(realm.as_str());
        if let Some(service) = params.get("service") {
            req = req.query("service", service);
        }
        let scope = params
            .get("scope")
            .cloned()
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
        req = req.query("scope", &scope);
        if let Some(basic) = self.options.credentials.get(&reference.registry) {
            req = req.header("Authorization", &format!("Basic {basic}"));
        }

        let resp = req.call().map_err(|e| self.err(reference, e.to_string()))?;
        let code = resp.status().as_u16();
        if code >= 400 {
            return Err(self.err(reference, format!("HTTP {code} while fetching token")));
        }
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| self.err(reference, e.to_string()))?;
        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| self.err(reference, format!("invalid token response: {e}")))?;
        let token = token
            .token
            .or(token.access_token)
            .ok_or_else(|| self.err(reference, "token response without a token".to_string()))?;

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(
                format!("{}/{}", reference.registry, reference.repository),
                token,
            );
        }
        Ok(())
    }

    fn err(&self, reference: &OciReference, reason: String) -> Error {
        Error::Registry {
            reference: reference.to_string(),
            reason,
        }
    }

    fn cache_path(&self, digest: &str) -> Option<PathBuf> {
        let (algorithm, hex) = digest.split_once(':')?;
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        self.options
            .cache_dir
            .as_ref()
            .map(|dir| dir.join("blobs").join(algorithm).join(hex))
    }

    fn download_blob(&self, reference: &OciReference, digest: &str) -> Result<Vec<u8>> {
        let url = self.url(reference, "blobs", digest);
        let resp = self.send(reference, &url, None)?;
        let code = resp.status().as_u16();
        if code >= 400 {
            return Err(self.err(reference, format!("HTTP {code} for blob {digest}")));
        }
        let mut data = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut data)
            .map_err(|e| self.err(reference, e.to_string()))?;
        Ok(data)
    }
}

impl OciClient for RegistryClient {
    fn get_manifest(&self, reference: &OciReference) -> Result<Option<Vec<u8>>> {
        let url = self.url(reference, "manifests", reference.reference());
        let accept = format!("{OCI_MANIFEST_MEDIA_TYPE}, {DOCKER_MANIFEST_MEDIA_TYPE}, {MANIFEST_ACCEPT}");
        let resp = self.send(reference, &url, Some(&accept))?;
        match resp.status().as_u16() {
            404 => Ok(None),
            code if code >= 400 => Err(self.err(reference, format!("HTTP {code} for manifest"))),
            _ => {
                let mut data = Vec::new();
                resp.into_body()
                    .into_reader()
                    .read_to_end(&mut data)
                    .map_err(|e| self.err(reference, e.to_string()))?;
                Ok(Some(data))
            }
        }
    }

    fn fetch_blob(
        &self,
        reference: &OciReference,
        digest: &str,
        sink: &mut dyn Write,
    ) -> Result<u64> {
        let cache = self.cache_path(digest);
        if let Some(path) = &cache {
            if let Ok(data) = std::fs::read(path) {
                tracing::debug!(%digest, "blob cache hit");
                sink.write_all(&data)?;
                return Ok(data.len() as u64);
            }
        }

        let data = self.download_blob(reference, digest)?;
        if let Some(path) = &cache {
            let actual = format!("sha256:{:x}", Sha256::digest(&data));
            if actual == digest {
                store_in_cache(path, &data);
            } else {
                tracing::warn!(%digest, %actual, "not caching blob with mismatching digest");
            }
        }
        sink.write_all(&data)?;
        Ok(data.len() as u64)
    }
}

fn store_in_cache(path: &Path, data: &[u8]) {
    let result = path
        .parent()
        .map(std::fs::create_dir_all)
        .unwrap_or(Ok(()))
        .and_then(|_| {
            let tmp = path.with_extension("partial");
            std::fs::write(&tmp, data)?;
            std::fs::rename(&tmp, path)
        });
    if let Err(err) = result {
        tracing::warn!(path = ?path, %err, "failed to write blob cache");
    }
}

/// Split `key="value",key2="value2"` into a map.
fn parse_challenge(params: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut rest = params.trim();
    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_string();
        let after = after.trim_start();
        let (value, remaining) = match after.strip_prefix('"') {
            Some(quoted) => match quoted.split_once('"') {
                Some((value, remaining)) => (value, remaining),
                None => (quoted, ""),
            },
            None => match after.split_once(',') {
                Some((value, remaining)) => (value, remaining),
                None => (after, ""),
            },
        };
        out.insert(key, value.to_string());
        rest = remaining.trim_start_matches(',').trim();
    }
    out
}
