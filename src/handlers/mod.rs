//! The stock handlers served by `rivulet-server`.
//!
//! | Route                 | Kind   | Behaviour                                      |
//! |-----------------------|--------|------------------------------------------------|
//! | `/`                   | exact  | `200 OK`, empty body                           |
//! | `/echo/{text}`        | prefix | `200 OK`, body is `{text}`                     |
//! | `/user-agent`         | exact  | `200 OK`, body is the `User-Agent` header      |
//! | `/files/{name}`       | prefix | read (`GET`) or write (`POST`) a file          |
//!
//! `/files/` is only mounted when the configuration names a directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::ServerConfig;
use crate::{Method, Request, Response, Router, StatusCode};

pub const ECHO_PREFIX: &str = "/echo/";
pub const USER_AGENT_PATH: &str = "/user-agent";
pub const FILES_PREFIX: &str = "/files/";

/// Mount every stock handler on `router`.
pub fn register_defaults(router: &mut Router, config: &ServerConfig) {
    router
        .exact("/", root)
        .prefix(ECHO_PREFIX, echo)
        .exact(USER_AGENT_PATH, user_agent);

    if let Some(dir) = &config.directory {
        let store = FileStore::new(dir);
        router.prefix(FILES_PREFIX, move |req: &Request| store.handle(req));
    }
}

pub fn root(_request: &Request) -> Response {
    Response::new(StatusCode::Ok)
}

pub fn echo(request: &Request) -> Response {
    let text = request
        .path()
        .strip_prefix(ECHO_PREFIX)
        .unwrap_or_default()
        .to_owned();
    Response::new(StatusCode::Ok)
        .header("Content-Type", "text/plain")
        .body(text)
}

pub fn user_agent(request: &Request) -> Response {
    match request.header("user-agent") {
        Some(agent) => Response::new(StatusCode::Ok)
            .header("Content-Type", "text/plain")
            .body(agent.to_owned()),
        None => Response::new(StatusCode::BadRequest),
    }
}

/// Reads and writes files below a fixed root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Serve `GET` and `POST` for `/files/{name}`.
    pub fn handle(&self, request: &Request) -> Response {
        let name = request.path().strip_prefix(FILES_PREFIX).unwrap_or_default();
        let Some(path) = self.resolve(name) else {
            return Response::new(StatusCode::BadRequest);
        };

        match request.method() {
            Method::Get => self.read(&path),
            Method::Post => self.write(&path, request.body()),
            _ => Response::new(StatusCode::MethodNotAllowed).header("Allow", "GET, POST"),
        }
    }

    /// Maps a file name onto the root. Names that could escape it are refused.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let escapes = name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..");
        (!escapes).then(|| self.root.join(name))
    }

    fn read(&self, path: &Path) -> Response {
        match fs::read(path) {
            Ok(contents) => Response::new(StatusCode::Ok)
                .header("Content-Type", "application/octet-stream")
                .body_bytes(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Response::new(StatusCode::NotFound),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read file");
                Response::new(StatusCode::InternalServerError)
            }
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Response {
        match fs::write(path, contents) {
            Ok(()) => Response::new(StatusCode::Created),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write file");
                Response::new(StatusCode::InternalServerError)
            }
        }
    }
}
