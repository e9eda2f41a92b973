use log::{error, info, warn};
use rappel::configuration::config::Config;
use rappel::storage::selector;
use rappel::web_interface::WebServer;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
██████╗  █████╗ ██████╗ ██████╗ ███████╗██╗
██╔══██╗██╔══██╗██╔══██╗██╔══██╗██╔════╝██║
██████╔╝███████║██████╔╝██████╔╝█████╗  ██║
██╔══██╗██╔══██║██╔═══╝ ██╔═══╝ ██╔══╝  ██║
██║  ██║██║  ██║██║     ██║     ███████╗███████╗
╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝     ╚══════╝╚══════╝
================================================
           Webhook callback manager
================================================
"
    );

    let config = Config::from_args();

    let tz = match config.tz() {
        Ok(tz) => tz,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let kind = match config.backend_kind() {
        Ok(kind) => kind,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let storage = match selector::connect(kind, tz, &config).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Error initializing database: {}", e);
            std::process::exit(1);
        }
    };
    info!("Database initialized ({})", kind);

    // The routing layer registers dynamic listener paths once at startup;
    // routes created later are served by the catch-all until a restart.
    match storage.get_routes().await {
        Ok(routes) => {
            for route in &routes {
                info!("Registered callback route: /callback{}", route.path);
            }
        }
        Err(e) => warn!("Unable to load registered routes: {}", e),
    }

    info!("Timezone: {}", config.timezone);
    info!("Whitelisted IPs: {}", config.allowed_ips.join(", "));
    info!("Web Interface: http://localhost:{}", config.port);
    info!(
        "Callback endpoint: http://localhost:{}/callback/{{your-path}}",
        config.port
    );

    let server = WebServer::new(storage.clone(), config.allowed_ips.clone());
    let port = config.port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.start(port).await {
            error!("Error occured in the web server: {}, exiting...", e);
            std::process::exit(1);
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutting down gracefully...");
            server_handle.abort();
            storage.close().await;
            info!("Database connection closed");
        }
        Err(e) => {
            error!("Unable to listen for shutdown signal: {}", e);
        }
    }
}
