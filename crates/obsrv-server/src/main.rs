use clap::{App, Arg};
use obcore::config::ServerConfig;
use obcore::logging;
use obengine::host::NoopHostRuntime;
use obengine::{Engine, Server};
use obsrv_server::{ohsrv, osrv};
use slog::{info, o};
use std::sync::Arc;

pub fn main() {
    let matches = App::new("obsrv-server")
        .version("0.1.0")
        .author("Bush Hammer Industries")
        .about("Runs the object server's line and HTTP listeners.")
        .arg(
            Arg::with_name("CONFIG_FILE")
                .help("Path to the JSON config file; defaults are used if omitted")
                .required(false),
        )
        .get_matches();

    let config = match matches.value_of("CONFIG_FILE") {
        Some(path) => ServerConfig::from_file(path).expect("error loading config file"),
        None => ServerConfig::default(),
    };

    let logger = logging::init(&config.logging);
    info!(logger, "starting obsrv-server"; "line_port" => config.line_port, "http_port" => config.http_port);

    let engine = Arc::new(Engine::new(Arc::new(NoopHostRuntime)));

    let line_logger = logger.new(o!("protocol" => "osrv"));
    let line_engine = Arc::clone(&engine);
    let _line_server = Server::start(
        &config.line_host,
        config.line_port,
        config.workers,
        line_logger.clone(),
        move |stream| osrv::handle_connection(stream, Arc::clone(&line_engine), line_logger.clone()),
    )
    .expect("failed to bind line protocol listener");

    let http_logger = logger.new(o!("protocol" => "ohsrv"));
    let http_engine = Arc::clone(&engine);
    let http_line_buffer = config.http_line_buffer;
    let _http_server = Server::start(
        &config.http_host,
        config.http_port,
        config.workers,
        http_logger.clone(),
        move |stream| {
            ohsrv::handle_connection(
                stream,
                Arc::clone(&http_engine),
                http_logger.clone(),
                http_line_buffer,
                2_000_000_000,
            )
        },
    )
    .expect("failed to bind HTTP protocol listener");

    info!(logger, "both listeners started; serving forever");
    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
