#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

use sentinel::{
    clock::ManualClock,
    config::Config,
    error::{AppError, Result},
    kv::{KvStore, StoreError, StoreResult, memory::MemoryStore},
    models::user::{UserAccess, VerifiedUser},
    routes::build_router,
    services::providers::{CredentialVerifier, RolePermissionProvider},
    state::AppState,
};

pub const PASSWORD: &str = "correct horse battery";

struct DirectoryUser {
    id: Uuid,
    password: String,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
    auth_version: i64,
}

/// Users kept in memory, standing in for the database.
#[derive(Default)]
pub struct UserDirectory {
    users: Mutex<HashMap<String, DirectoryUser>>,
    provider_calls: AtomicUsize,
    provider_down: AtomicBool,
}

impl UserDirectory {
    pub fn add(&self, username: &str, roles: &[&str], permissions: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            username.to_string(),
            DirectoryUser {
                id,
                password: PASSWORD.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
                permissions: permissions.iter().map(|p| p.to_string()).collect(),
                auth_version: 1,
            },
        );
        id
    }

    /// Replaces a user's roles and bumps their authorization version.
    pub fn set_roles(&self, username: &str, roles: &[&str]) {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(username).unwrap();
        user.roles = roles.iter().map(|r| r.to_string()).collect();
        user.auth_version += 1;
    }

    pub fn provider_calls(&self) -> usize {
        self.provider_calls.load(Ordering::SeqCst)
    }

    pub fn set_provider_down(&self, down: bool) {
        self.provider_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialVerifier for UserDirectory {
    async fn verify_credentials(&self, username: &str, password: &str) -> Result<VerifiedUser> {
        let users = self.users.lock().unwrap();
        match users.get(username) {
            Some(user) if user.password == password => Ok(VerifiedUser {
                id: user.id,
                username: username.to_string(),
                email: Some(format!("{}@example.com", username)),
                auth_version: user.auth_version,
            }),
            _ => Err(AppError::Authentication("bad credentials".to_string())),
        }
    }

    async fn change_password(&self, user_id: Uuid, current: &str, new: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .values_mut()
            .find(|u| u.id == user_id)
            .ok_or(AppError::NotFound)?;
        if user.password != current {
            return Err(AppError::Authentication("bad current password".to_string()));
        }
        user.password = new.to_string();
        user.auth_version += 1;
        Ok(())
    }
}

#[async_trait]
impl RolePermissionProvider for UserDirectory {
    async fn get_user_roles_and_permissions(&self, user_id: Uuid) -> Result<UserAccess> {
        self.provider_calls.fetch_add(1, Ordering::SeqCst);
        if self.provider_down.load(Ordering::SeqCst) {
            return Err(AppError::Internal("directory offline".to_string()));
        }
        let users = self.users.lock().unwrap();
        let user = users
            .values()
            .find(|u| u.id == user_id)
            .ok_or(AppError::NotFound)?;
        Ok(UserAccess {
            roles: user.roles.clone(),
            permissions: user.permissions.clone(),
            auth_version: user.auth_version,
        })
    }
}

/// A memory store that can be switched off to simulate an outage, fail
/// single commands, or hang on in-place updates.
pub struct SwitchableStore {
    inner: MemoryStore,
    down: AtomicBool,
    failing: Mutex<HashSet<&'static str>>,
    stall_updates: AtomicBool,
}

impl SwitchableStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            stall_updates: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Makes only the named command fail, e.g. `"zrange"`.
    pub fn fail_command(&self, command: &'static str, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(command);
        } else {
            failing.remove(command);
        }
    }

    /// Makes `set_existing` hang far longer than any request deadline.
    pub fn stall_updates(&self, stall: bool) {
        self.stall_updates.store(stall, Ordering::SeqCst);
    }

    fn check(&self, command: &'static str) -> StoreResult<()> {
        if self.down.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(command) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for SwitchableStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check("set_ex")?;
        self.inner.set_ex(key, value, ttl).await
    }

    async fn set_existing(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.check("set_existing")?;
        if self.stall_updates.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.set_existing(key, value).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check("get")?;
        self.inner.get(key).await
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.check("del")?;
        self.inner.del(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        self.check("expire")?;
        self.inner.expire(key, ttl).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check("incr")?;
        self.inner.incr(key).await
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.check("zadd")?;
        self.inner.zadd(key, member, score).await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        self.check("zrem")?;
        self.inner.zrem(key, member).await
    }

    async fn zrange(&self, key: &str) -> StoreResult<Vec<String>> {
        self.check("zrange")?;
        self.inner.zrange(key).await
    }
}

/// A fully wired router over in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<UserDirectory>,
    pub store: Arc<SwitchableStore>,
    pub clock: ManualClock,
}

/// What the tests need from a response.
pub struct Reply {
    pub status: StatusCode,
    pub set_cookie: Vec<String>,
    pub request_id: Option<String>,
    pub body: Value,
}

impl Reply {
    /// The value of a newly issued session cookie, if any.
    pub fn session_token(&self) -> Option<String> {
        self.set_cookie.iter().find_map(|c| {
            let value = c.strip_prefix("session=")?.split(';').next()?;
            (!value.is_empty()).then(|| value.to_string())
        })
    }

    /// Whether the response tells the client to drop its session cookie.
    pub fn clears_session_cookie(&self) -> bool {
        self.set_cookie
            .iter()
            .any(|c| c.starts_with("session=;") && c.contains("Max-Age=0"))
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::new(vec![7u8; 32]))
    }

    pub fn with_config(config: Config) -> Self {
        let clock = ManualClock::new(Utc::now());
        let store = Arc::new(SwitchableStore::new(MemoryStore::new(Arc::new(
            clock.clone(),
        ))));
        let users = Arc::new(UserDirectory::default());
        let state = AppState::with_backends(
            &config,
            store.clone(),
            users.clone(),
            users.clone(),
            Arc::new(clock.clone()),
        );

        Self {
            router: build_router(state.clone()),
            state,
            users,
            store,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        let request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        Reply {
            status,
            set_cookie,
            request_id,
            body,
        }
    }

    pub async fn login_with(&self, username: &str, password: &str) -> Reply {
        let body = serde_json::json!({ "username": username, "password": password });
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::USER_AGENT, "integration-test")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Logs in with the shared test password and returns the session token.
    pub async fn login(&self, username: &str) -> String {
        let reply = self.login_with(username, PASSWORD).await;
        assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
        reply.session_token().expect("login sets a session cookie")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Reply {
        self.send(request("GET", path, token, None)).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Option<Value>) -> Reply {
        self.send(request("POST", path, token, body)).await
    }
}

pub fn request(method: &str, path: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("session={}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
