use cli::ServerArgs;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();
    logging::init(args.verbose);

    let listener = match TcpListener::bind(("0.0.0.0", args.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(port = args.port, %err, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(path = %args.path.display(), port = args.port, "filebox-server listening");

    if let Err(err) = server::serve(listener, args.path).await {
        tracing::error!(%err, "server loop exited");
        std::process::exit(1);
    }
}
