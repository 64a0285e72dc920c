//! 令牌池
//!
//! 有序、容量受限、有效期受限的一次性令牌集合。
//!
//! - 插入顺序即取出顺序（FIFO），`pop` 总是返回最早的令牌
//! - 容量满时先淘汰最早的令牌再插入，容量任何时刻都不会被超过
//! - 过期令牌在读取前由 `expire_old_tokens` 惰性清理，不使用后台定时器
//!
//! 所有修改只通过 push / pop / remove / expire / clear 完成，每个操作在锁内原子执行。
//! 修改后在锁内生成带修订号的快照，释放令牌池锁之后再写入持久化后端；
//! 写入按修订号串行，较旧的快照不会覆盖较新的快照。

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::token::Token;
use crate::core::config::TokenConfig;
use crate::utils::{CoreError, Result};

/// 令牌持久化后端
pub trait TokenBackend: Send + Sync + fmt::Debug {
    /// 读取已保存的令牌（按插入顺序）
    fn load(&self) -> Result<Vec<Token>>;

    /// 保存当前令牌快照
    fn save(&self, tokens: &[Token]) -> Result<()>;

    /// 是否需要保存快照；返回 `false` 时令牌池不生成快照
    fn is_persistent(&self) -> bool {
        true
    }
}

/// 内存后端，不做持久化
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend;

impl TokenBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<Token>> {
        Ok(Vec::new())
    }

    fn save(&self, _tokens: &[Token]) -> Result<()> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// JSON 文件后端
///
/// 每次修改后整体重写文件，令牌池可以跨进程重启保留。写入是同步文件 IO，
/// 会阻塞调用线程（但不持有令牌池锁），适合令牌数量和请求频率都较低的客户端。
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenBackend for JsonFileBackend {
    fn load(&self) -> Result<Vec<Token>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| CoreError::TokenPersistence(format!("{}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| CoreError::TokenPersistence(format!("{}: {}", self.path.display(), e)))
    }

    fn save(&self, tokens: &[Token]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, content)
            .map_err(|e| CoreError::TokenPersistence(format!("{}: {}", self.path.display(), e)))
    }
}

/// 待持久化的令牌快照
struct Snapshot {
    revision: u64,
    tokens: Vec<Token>,
}

/// 令牌池
pub struct TokenStore {
    tokens: Mutex<IndexMap<String, Token>>,
    max_size: AtomicUsize,
    token_time_limit: Duration,
    backend: Arc<dyn TokenBackend>,
    /// 快照修订号，只在令牌池锁内递增
    revision: AtomicU64,
    /// 已写入后端的最新修订号，同时串行化写入
    persisted: Mutex<u64>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore")
            .field("size", &self.size())
            .field("max_size", &self.max_size())
            .field("token_time_limit", &self.token_time_limit)
            .field("backend", &self.backend)
            .finish()
    }
}

impl TokenStore {
    /// 创建内存令牌池
    pub fn new(max_size: usize, token_time_limit: Duration) -> Self {
        Self {
            tokens: Mutex::new(IndexMap::new()),
            max_size: AtomicUsize::new(max_size.max(1)),
            token_time_limit,
            backend: Arc::new(MemoryBackend),
            revision: AtomicU64::new(0),
            persisted: Mutex::new(0),
        }
    }

    /// 使用持久化后端创建令牌池，并载入已保存的令牌
    ///
    /// 载入时仍然遵守容量限制，超出部分按最早优先淘汰。
    pub fn with_backend(
        max_size: usize,
        token_time_limit: Duration,
        backend: Arc<dyn TokenBackend>,
    ) -> Result<Self> {
        let store = Self {
            backend,
            ..Self::new(max_size, token_time_limit)
        };
        let persisted = store.backend.load()?;
        {
            let mut tokens = store.tokens.lock();
            for token in persisted {
                store.insert_locked(&mut tokens, token);
            }
            tracing::debug!(size = tokens.len(), "令牌池已载入");
        }
        Ok(store)
    }

    /// 由配置创建令牌池，配置了 `store_path` 时使用 JSON 文件后端
    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        let limit = Duration::from_millis(config.token_time_limit_ms);
        match config.store_path {
            Some(ref path) => {
                Self::with_backend(config.max_size, limit, Arc::new(JsonFileBackend::new(path)))
            }
            None => Ok(Self::new(config.max_size, limit)),
        }
    }

    /// 容量满时淘汰最早的令牌，然后插入
    fn insert_locked(&self, tokens: &mut IndexMap<String, Token>, token: Token) -> bool {
        if tokens.contains_key(&token.value) {
            return false;
        }
        let max_size = self.max_size();
        while tokens.len() >= max_size {
            if let Some((evicted, _)) = tokens.shift_remove_index(0) {
                tracing::trace!(token = %evicted, "令牌池已满，淘汰最早的令牌");
            }
        }
        tokens.insert(token.value.clone(), token);
        true
    }

    /// 在令牌池锁内生成快照
    fn snapshot_locked(&self, tokens: &IndexMap<String, Token>) -> Option<Snapshot> {
        if !self.backend.is_persistent() {
            return None;
        }
        Some(Snapshot {
            revision: self.revision.fetch_add(1, Ordering::SeqCst) + 1,
            tokens: tokens.values().cloned().collect(),
        })
    }

    /// 在令牌池锁外写入快照，跳过比已写入版本更旧的快照
    fn persist(&self, snapshot: Option<Snapshot>) {
        let Some(snapshot) = snapshot else {
            return;
        };
        let mut persisted = self.persisted.lock();
        if snapshot.revision <= *persisted {
            return;
        }
        match self.backend.save(&snapshot.tokens) {
            Ok(()) => *persisted = snapshot.revision,
            Err(e) => tracing::warn!(error = %e, "令牌池持久化失败"),
        }
    }

    /// 加入令牌
    ///
    /// 已存在相同值的令牌时忽略并返回 `false`。
    pub fn push(&self, token: impl Into<Token>) -> bool {
        let token = token.into();
        let (added, snapshot) = {
            let mut tokens = self.tokens.lock();
            let added = self.insert_locked(&mut tokens, token);
            (added, if added { self.snapshot_locked(&tokens) } else { None })
        };
        self.persist(snapshot);
        added
    }

    /// 取出最早的令牌
    pub fn pop(&self) -> Option<Token> {
        let (token, snapshot) = {
            let mut tokens = self.tokens.lock();
            let token = tokens.shift_remove_index(0).map(|(_, token)| token);
            let snapshot = token.as_ref().and_then(|_| self.snapshot_locked(&tokens));
            (token, snapshot)
        };
        self.persist(snapshot);
        token
    }

    /// 是否包含该令牌值
    pub fn has(&self, value: &str) -> bool {
        self.tokens.lock().contains_key(value)
    }

    /// 移除令牌，返回是否存在
    pub fn remove(&self, value: &str) -> bool {
        let (removed, snapshot) = {
            let mut tokens = self.tokens.lock();
            let removed = tokens.shift_remove(value).is_some();
            (removed, if removed { self.snapshot_locked(&tokens) } else { None })
        };
        self.persist(snapshot);
        removed
    }

    /// 当前令牌数量
    pub fn size(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }

    /// 令牌快照（按插入顺序）
    pub fn tokens(&self) -> IndexMap<String, Token> {
        self.tokens.lock().clone()
    }

    /// 令牌值列表（按插入顺序）
    pub fn index(&self) -> Vec<String> {
        self.tokens.lock().keys().cloned().collect()
    }

    /// 清理过期令牌，返回清理数量
    pub fn expire_old_tokens(&self) -> usize {
        let now = Utc::now();
        let (expired, snapshot) = {
            let mut tokens = self.tokens.lock();
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired(self.token_time_limit, now));
            let expired = before - tokens.len();
            if expired > 0 {
                tracing::debug!(expired, remaining = tokens.len(), "清理过期令牌");
                (expired, self.snapshot_locked(&tokens))
            } else {
                (0, None)
            }
        };
        self.persist(snapshot);
        expired
    }

    /// 清空令牌池
    pub fn clear(&self) {
        let snapshot = {
            let mut tokens = self.tokens.lock();
            tokens.clear();
            self.snapshot_locked(&tokens)
        };
        self.persist(snapshot);
    }

    /// 当前容量
    pub fn max_size(&self) -> usize {
        self.max_size.load(Ordering::SeqCst)
    }

    /// 调整容量，小于 1 时按 1 处理；超出新容量的令牌立即按最早优先淘汰
    pub fn set_max_size(&self, max_size: usize) {
        let max_size = max_size.max(1);
        let snapshot = {
            let mut tokens = self.tokens.lock();
            self.max_size.store(max_size, Ordering::SeqCst);
            if tokens.len() > max_size {
                let excess = tokens.len() - max_size;
                tokens.drain(..excess);
                self.snapshot_locked(&tokens)
            } else {
                None
            }
        };
        self.persist(snapshot);
    }

    pub fn token_time_limit(&self) -> Duration {
        self.token_time_limit
    }

    /// 以 debug 级别输出令牌池快照
    pub fn log(&self) {
        let tokens = self.tokens.lock();
        let now = Utc::now();
        let entries: Vec<String> = tokens
            .values()
            .map(|t| format!("{} ({}ms)", t.value, (now - t.received_at).num_milliseconds()))
            .collect();
        tracing::debug!(
            pool_size = tokens.len(),
            max_size = self.max_size(),
            tokens = ?entries,
            "令牌池快照"
        );
    }
}
