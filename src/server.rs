use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use tiny_http::{Request, Server};

use crate::arg::Settings;
use crate::content_type::ContentTypes;
use crate::drive::Provider;
use crate::error::GatewayError;
use crate::lifecycle::{Init, Lifecycle};
use crate::request::{Dispatcher, RequestDescriptor};
use crate::response::exec_response;

/// A running gateway.
///
/// A fixed pool of worker threads takes requests off the listener, one request per worker at a
/// time. The storage provider is created by `init` on the first request that needs it.
pub struct Gateway<P: Provider> {
    server: Option<Arc<Server>>,
    workers: Vec<JoinHandle<()>>,
    closing: Arc<AtomicBool>,
    lifecycle: Arc<Lifecycle<P>>,
    port: u16,
}

impl<P: Provider> Gateway<P> {

    /// Bind and start accepting requests. Returns once the socket is listening.
    pub fn start(settings: &Settings, init: Init<P>) -> Result<Gateway<P>, GatewayError> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let server = match Server::http(addr.as_str()) {
            Ok(v) => Arc::new(v),
            Err(e) => {
                return Err(GatewayError::Bind {
                    addr,
                    reason: e.to_string(),
                });
            },
        };
        let port = server
            .server_addr()
            .to_ip()
            .map(|v| v.port())
            .unwrap_or(settings.port);

        let mut content_types = ContentTypes::new();
        for (ext, typ) in settings.mime_types.iter() {
            debug!("serving .{} as {}", ext, typ);
            content_types.define(ext, typ.clone());
        }
        let lifecycle = Arc::new(Lifecycle::new(init));
        let dispatcher = Arc::new(Dispatcher::new(lifecycle.clone(), content_types));
        let closing = Arc::new(AtomicBool::new(false));

        let mut gateway = Gateway {
            server: Some(server.clone()),
            workers: vec!(),
            closing: closing.clone(),
            lifecycle,
            port,
        };
        let expose_errors = settings.expose_errors;
        for i in 0..settings.workers.max(1) {
            let srv = server.clone();
            let dispatcher = dispatcher.clone();
            let flag = closing.clone();
            let worker = thread::Builder::new()
                .name(format!("drivegate-worker-{}", i))
                .spawn(move || serve_loop(srv, dispatcher, expose_errors, flag))
                .map_err(|e| GatewayError::io(addr.as_str(), e))?;
            gateway.workers.push(worker);
        }
        debug!("started {} request workers", gateway.workers.len());

        info!("Listening on http://localhost:{}", port);
        Ok(gateway)
    }

    /// The port actually bound, which differs from the configured one when that was 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting requests and let the workers finish what they are serving, then release
    /// the storage provider.
    pub fn close(mut self) -> Result<(), GatewayError> {
        self.stop();
        self.lifecycle.shutdown()
    }

    fn stop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(v) = self.server.as_ref() {
            // each unblock releases one waiting worker
            for _ in 0..self.workers.len() {
                v.unblock();
            }
        }
        for h in self.workers.drain(..) {
            if h.join().is_err() {
                error!("request worker panicked");
            }
        }
        // last reference, drops the listening socket
        self.server.take();
    }
}

impl<P: Provider> Drop for Gateway<P> {
    fn drop(&mut self) {
        if self.server.is_none() {
            return;
        }
        self.stop();
        if let Err(e) = self.lifecycle.shutdown() {
            error!("{}", e.report());
        }
    }
}

fn serve_loop<P: Provider>(server: Arc<Server>, dispatcher: Arc<Dispatcher<P>>, expose_errors: bool, closing: Arc<AtomicBool>) {
    loop {
        let req = match server.recv() {
            Ok(v) => v,
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                error!("{}", e);
                continue;
            },
        };
        handle(req, &dispatcher, expose_errors);
    }
    debug!("request worker done");
}

fn handle<P: Provider>(req: Request, dispatcher: &Dispatcher<P>, expose_errors: bool) {
    let desc = RequestDescriptor {
        method: req.method().clone(),
        raw_path: req.url().to_string(),
    };
    debug!("processing request {} {}", &desc.method, &desc.raw_path);
    let r = dispatcher.process(&desc);
    exec_response(req, r, expose_errors);
}

#[cfg(test)]
mod tests {
    use std::fs::{create_dir_all, write};
    use std::io::Read;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::Gateway;
    use crate::arg::Settings;
    use crate::drive::fs::FsProvider;
    use crate::drive::memory::{MemoryDrive, MemoryProvider};
    use crate::drive::DriveKey;

    struct Reply {
        status: u16,
        content_type: Option<String>,
        content_length: Option<String>,
        body: Vec<u8>,
    }

    impl Reply {
        fn text(&self) -> String {
            String::from_utf8(self.body.clone()).unwrap()
        }
    }

    fn settings() -> Settings {
        let mut s = Settings::new();
        s.host = String::from("127.0.0.1");
        s.port = 0;
        s
    }

    fn drive() -> MemoryDrive {
        MemoryDrive::new()
            .with_file("/a.txt", "foo")
            .with_file("/sub/b.txt", "bar")
    }

    fn start(drive: MemoryDrive) -> Gateway<MemoryProvider> {
        let _ = env_logger::builder().is_test(true).try_init();
        Gateway::start(&settings(), Box::new(move || {
            Ok(MemoryProvider::new().with_drive("example", drive.clone()))
        })).unwrap()
    }

    fn fetch(port: u16, method: &str, path: &str) -> Reply {
        let url = format!("http://127.0.0.1:{}{}", port, path);
        let res = match ureq::request(method, &url).call() {
            Ok(v) => v,
            Err(ureq::Error::Status(_, v)) => v,
            Err(e) => {
                panic!("request to {} failed: {}", url, e);
            },
        };
        let status = res.status();
        let content_type = res.header("Content-Type").map(String::from);
        let content_length = res.header("Content-Length").map(String::from);
        let mut body = vec!();
        res.into_reader().read_to_end(&mut body).unwrap();
        Reply {
            status,
            content_type,
            content_length,
            body,
        }
    }

    #[test]
    fn test_listing() {
        let g = start(drive());
        let r = fetch(g.port(), "GET", "/hyper/example/");
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("application/json"));
        assert_eq!(r.text(), "[\"a.txt\",\"sub/\"]");
        g.close().unwrap();
    }

    #[test]
    fn test_index_and_no_resolve() {
        let g = start(drive().with_file("/index.md", "# hello"));
        let r = fetch(g.port(), "GET", "/hyper/example/");
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("text/markdown"));
        assert_eq!(r.content_length.as_deref(), Some("7"));
        assert_eq!(r.text(), "# hello");

        let r = fetch(g.port(), "GET", "/hyper/example/?noResolve");
        assert_eq!(r.status, 200);
        assert_eq!(r.text(), "[\"a.txt\",\"index.md\",\"sub/\"]");
        g.close().unwrap();
    }

    #[test]
    fn test_not_found() {
        let g = start(drive());
        let r = fetch(g.port(), "GET", "/hyper/example/missing");
        assert_eq!(r.status, 404);
        assert_eq!(r.content_type.as_deref(), Some("text/plain"));
        assert_eq!(r.text(), "Not Found");

        let r = fetch(g.port(), "GET", "/other/example/a.txt");
        assert_eq!(r.status, 404);
        assert_eq!(r.text(), "Not Found");
        g.close().unwrap();
    }

    #[test]
    fn test_method_not_allowed() {
        let g = start(drive());
        let r = fetch(g.port(), "POST", "/hyper/example/a.txt");
        assert_eq!(r.status, 405);
        assert_eq!(r.text(), "Method Not Allowed");
        g.close().unwrap();
    }

    #[test]
    fn test_failure() {
        let g = start(drive());
        let r = fetch(g.port(), "GET", "/hyper/nobody/a.txt");
        assert_eq!(r.status, 500);
        assert_eq!(r.text(), "Internal Server Error");
        g.close().unwrap();

        let mut s = settings();
        s.expose_errors = true;
        let g: Gateway<MemoryProvider> = Gateway::start(&s, Box::new(|| Ok(MemoryProvider::new()))).unwrap();
        let r = fetch(g.port(), "GET", "/hyper/nobody/a.txt");
        assert_eq!(r.status, 500);
        assert!(r.text().contains("nobody"));
        g.close().unwrap();
    }

    #[test]
    fn test_large_file_has_length() {
        let data = vec!(0x2au8; 100_000);
        let g = start(drive().with_file("/big.bin", data.clone()));
        let r = fetch(g.port(), "GET", "/hyper/example/big.bin");
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(r.content_length.as_deref(), Some("100000"));
        assert_eq!(r.body, data);
        g.close().unwrap();
    }

    #[test]
    fn test_idempotent() {
        let g = start(drive().with_file("/post.gmi", "=> gemini://example"));
        let a = fetch(g.port(), "GET", "/hyper/example/post");
        let b = fetch(g.port(), "GET", "/hyper/example/post");
        assert_eq!(a.status, 200);
        assert_eq!(a.content_type.as_deref(), Some("text/gemini"));
        assert_eq!((a.status, a.content_type, a.content_length, a.body), (b.status, b.content_type, b.content_length, b.body));
        g.close().unwrap();
    }

    #[test]
    fn test_lazy_single_init() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let g: Gateway<MemoryProvider> = Gateway::start(&settings(), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            Ok(MemoryProvider::new().with_drive("example", drive()))
        })).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let port = g.port();
        let handles: Vec<_> = (0..6)
            .map(|_| thread::spawn(move || fetch(port, "GET", "/hyper/example/a.txt").status))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 200);
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let p = g.lifecycle.get().unwrap();
        g.close().unwrap();
        assert!(p.is_closed());
    }

    #[test]
    fn test_close_finishes_in_flight() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let g: Gateway<MemoryProvider> = Gateway::start(&settings(), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(200));
            Ok(MemoryProvider::new().with_drive("example", drive()))
        })).unwrap();

        let port = g.port();
        let h = thread::spawn(move || fetch(port, "GET", "/hyper/example/a.txt"));
        while count.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(5));
        }
        let lifecycle = g.lifecycle.clone();
        g.close().unwrap();

        let r = h.join().unwrap();
        assert_eq!(r.status, 200);
        assert_eq!(r.text(), "foo");
        assert!(lifecycle.get().is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_without_requests() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let g: Gateway<MemoryProvider> = Gateway::start(&settings(), Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(MemoryProvider::new())
        })).unwrap();
        g.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_directory_storage() {
        let d = tempdir().unwrap();
        let key = DriveKey::from_str("example").unwrap();
        let root = d.path().join(key.to_string());
        create_dir_all(root.join("notes")).unwrap();
        write(root.join("notes").join("README.org"), b"* notes").unwrap();
        write(root.join("about.html"), b"<p>about</p>").unwrap();

        let _ = env_logger::builder().is_test(true).try_init();
        let storage = d.path().to_path_buf();
        let g = Gateway::start(&settings(), Box::new(move || FsProvider::open(&storage))).unwrap();

        let r = fetch(g.port(), "GET", "/hyper/example/notes/");
        assert_eq!(r.status, 200);
        assert_eq!(r.content_type.as_deref(), Some("text/org"));
        assert_eq!(r.text(), "* notes");

        let r = fetch(g.port(), "GET", "/hyper/example/about");
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
        assert_eq!(r.text(), "<p>about</p>");

        let r = fetch(g.port(), "GET", "/hyper/example/");
        assert_eq!(r.text(), "[\"about.html\",\"notes/\"]");

        let r = fetch(g.port(), "GET", "/hyper/elsewhere/");
        assert_eq!(r.status, 500);
        g.close().unwrap();
    }

    #[test]
    fn test_mime_override() {
        let mut s = settings();
        s.mime_types.push((String::from("txt"), mime::TEXT_HTML));
        let g: Gateway<MemoryProvider> = Gateway::start(&s, Box::new(|| {
            Ok(MemoryProvider::new().with_drive("example", drive()))
        })).unwrap();
        let r = fetch(g.port(), "GET", "/hyper/example/a.txt");
        assert_eq!(r.content_type.as_deref(), Some("text/html"));
        g.close().unwrap();
    }
}
