use crate::{
    config::{Backend, Storage},
    error::{Error, Result},
};
use derive_more::Display;
use log::{info, warn};
use redis::Client;
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

/// A string key-value store holding whole serialized blobs.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}

/// open the backend named by the storage config
pub fn open(storage: &Storage) -> Result<Box<dyn KvStore>> {
    let store: Box<dyn KvStore> = match storage.backend {
        Backend::Memory => {
            let store = MemoryStore::default();
            warn!("using {}, records are lost on exit", store);
            Box::new(store)
        }
        Backend::File => {
            let store = FileStore::new(&storage.path)?;
            info!("using {}", store);
            Box::new(store)
        }
        Backend::Redis => {
            let proto = if storage.redis.starts_with("unix") { Proto::Unix } else { Proto::Url };
            let store = RedisStore::new(Some(proto), None, &storage.redis, storage.port, storage.db)?;
            info!("using {}", store);
            Box::new(store)
        }
    };
    Ok(store)
}

#[derive(Debug, Default, Display)]
#[display(fmt = "memory store")]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| Error::Unknown(format!("memory store poisoned: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::Unknown(format!("memory store poisoned: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Display)]
#[display(fmt = "file store at {:?}", dir)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_of(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        // readers never observe a half-written blob
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path_of(key))?;
        Ok(())
    }
}

#[derive(Debug, Display)]
#[display(fmt = "{}, {}", proto, endpoint)]
pub struct RedisStore {
    endpoint: String,
    proto: Proto,
    client: Client,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Proto {
    Url,
    Unix,
}

impl std::fmt::Display for Proto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let proto = match self {
            Self::Unix => "unix socket",
            Self::Url => "redis",
        };
        write!(f, "{}", proto)
    }
}

impl RedisStore {
    /// connect to a new redis server
    pub fn new(
        proto: Option<Proto>,
        auth: Option<(&str, &str)>,
        path: &str,
        port: Option<u32>,
        db: Option<u8>,
    ) -> Result<Self> {
        let proto = proto.unwrap_or(Proto::Url);
        let endpoint = match proto {
            Proto::Url => redis_endpoint(auth, path, port, db),
            Proto::Unix => return Err(Error::NotSupport("Unix socket is not supported currently".to_string())),
        };

        Ok(Self {
            proto,
            client: Client::open(endpoint.as_str())?,
            endpoint,
        })
    }
}

fn redis_endpoint(auth: Option<(&str, &str)>, path: &str, port: Option<u32>, db: Option<u8>) -> String {
    let mut endpoint = "redis://".to_string();
    if let Some((user, passwd)) = auth {
        endpoint.push_str(format!("{}:{}@", user, passwd).as_str());
    }
    endpoint.push_str(path);
    if let Some(port) = port {
        endpoint.push_str(format!(":{}", port).as_str());
    }
    if let Some(db) = db {
        endpoint.push_str(format!("/{}", db).as_str());
    }
    endpoint
}

impl KvStore for RedisStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_connection()?;
        let res: Option<String> = redis::cmd("GET").arg(key).query(&mut conn)?;
        Ok(res)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.client.get_connection()?;
        Ok(redis::cmd("SET").arg(key).arg(value).query(&mut conn)?)
    }
}
