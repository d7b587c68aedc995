//! Process entry point: parses CLI flags, binds the three endpoints (spec
//! §6 "Endpoints"), and runs the render loop on the main thread (spec §4.7
//! "Thread ownership").

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use termweb_core::config::ServerConfig;
use termweb_core::orchestrator::{ControlCallbacks, PanelCallbacks, Server};
use termweb_core::surface::{Surface, TestSurface};
use termweb_core::ws::{WsServer, WsServerConfig};
use termweb_core::{log_error, log_info, signals};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = match ServerConfig::parse(args) {
        Ok(cfg) => cfg,
        Err(e) => {
            log_error!("argument error: {e}");
            return ExitCode::FAILURE;
        }
    };

    signals::init_term_signals();

    let panel_ws = match WsServer::bind("127.0.0.1:0", WsServerConfig { enable_zstd: false, ..Default::default() }) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log_error!("failed to bind panel websocket: {e}");
            return ExitCode::FAILURE;
        }
    };
    let control_ws = match WsServer::bind("127.0.0.1:0", WsServerConfig { enable_zstd: true, ..Default::default() }) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log_error!("failed to bind control websocket: {e}");
            return ExitCode::FAILURE;
        }
    };
    let http_addr = format!("127.0.0.1:{}", cfg.http_port);
    let http_server = match termweb_http::HttpServer::bind(&http_addr, std::path::PathBuf::from(&cfg.web_root)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            log_error!("failed to bind http server on {http_addr}: {e}");
            return ExitCode::FAILURE;
        }
    };

    log_info!(
        "listening: http={} panel_ws={} control_ws={}",
        http_server.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        panel_ws.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        control_ws.local_addr().map(|a| a.to_string()).unwrap_or_default(),
    );

    // No real terminal-emulator binding is linked; `TestSurface` stands in
    // for the out-of-scope "surface" SPI the render loop drives.
    let server = Server::new(
        (),
        Box::new(|_id, size, scale| {
            TestSurface::create(size, scale).map(|s| Box::new(s) as Box<dyn Surface>).map_err(termweb_core::error::Error::from)
        }),
    );

    let panel_callbacks = Arc::new(PanelCallbacks::new(server.clone()));
    let control_callbacks = Arc::new(ControlCallbacks::new(server.clone()));

    let panel_thread = {
        let panel_ws = panel_ws.clone();
        std::thread::spawn(move || panel_ws.serve(panel_callbacks))
    };
    let control_thread = {
        let control_ws = control_ws.clone();
        std::thread::spawn(move || control_ws.serve(control_callbacks))
    };
    let http_thread = {
        let http_server = http_server.clone();
        std::thread::spawn(move || http_server.serve())
    };

    let shutdown_monitor = {
        let server = server.clone();
        std::thread::spawn(move || {
            while !signals::should_terminate() && server.is_running() {
                std::thread::sleep(Duration::from_millis(100));
            }
            server.stop();
        })
    };

    server.run_render_loop();

    panel_ws.stop();
    control_ws.stop();
    http_server.stop();
    let _ = panel_thread.join();
    let _ = control_thread.join();
    let _ = http_thread.join();
    let _ = shutdown_monitor.join();

    log_info!("shutdown complete");
    ExitCode::SUCCESS
}
