use std::ffi::OsStr;

use cli::ClientArgs;
use rpc::Client;
use tokio::runtime::Handle;
use vfs::FileboxFs;

#[tokio::main]
async fn main() {
    let args = ClientArgs::parse();
    logging::init(args.verbose);

    let (client, mut exit_rx) = match Client::connect(&args.address).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(address = %args.address, %err, "can't connect to filebox server");
            std::process::exit(1);
        }
    };

    tracing::info!(address = %args.address, "connected");

    let fs = FileboxFs::new(client, Handle::current());
    let mountpoint = args.mountpoint.clone();

    let options = mount_options();
    let guard = match tokio::task::spawn_blocking({
        let mountpoint = mountpoint.clone();
        move || fuse_mt::spawn_mount(fuse_mt::FuseMT::new(fs, 1), &mountpoint, &options)
    })
    .await
    {
        Ok(Ok(guard)) => guard,
        Ok(Err(err)) => {
            tracing::error!(mountpoint = %mountpoint.display(), %err, "mount failed");
            std::process::exit(1);
        }
        Err(join_err) => {
            tracing::error!(%join_err, "mount task panicked");
            std::process::exit(1);
        }
    };

    tracing::info!(mountpoint = %mountpoint.display(), "mounted");

    // Exit is one-way and fatal: once the reader observes a terminal decode
    // error or the server closes the connection, unmount and give up. There
    // is no reconnect.
    let _ = exit_rx.recv().await;
    tracing::info!("unmounting");
    drop(guard);
}

/// Mount options matching the design's read-only-base + `direct_io` posture;
/// platform-specific volume-name options are added where the platform needs
/// them to identify the mount in its own UI.
fn mount_options() -> Vec<&'static OsStr> {
    let mut options = vec![
        OsStr::new("fsname=filebox"),
        OsStr::new("subtype=filebox"),
        OsStr::new("direct_io"),
    ];

    #[cfg(target_os = "macos")]
    {
        options.push(OsStr::new("noappledouble"));
        options.push(OsStr::new("volname=Filebox"));
    }

    options
}
