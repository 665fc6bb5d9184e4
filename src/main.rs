//! vfs-gateway command-line entry point

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use vfs_gateway::cache::CacheManager;
use vfs_gateway::config::{Config, DriverConfig};
use vfs_gateway::driver::local::LocalDriver;
use vfs_gateway::driver::Driver;
use vfs_gateway::hook::{HookRegistry, LogSubscriber};
use vfs_gateway::model::{GetArgs, LinkArgs, ListArgs, Obj};
use vfs_gateway::op::Dispatcher;
use vfs_gateway::storage::StorageManager;

/// Print usage information
fn print_usage() {
    eprintln!("Usage: vfs-gateway <config.yaml> <command> <path>");
    eprintln!();
    eprintln!("vfs-gateway - unified access to pluggable storage backends");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  ls <path>      List a directory");
    eprintln!("  stat <path>    Show a single object");
    eprintln!("  link <path>    Resolve a download link");
    eprintln!("  mkdir <path>   Create a directory and its parents");
    eprintln!("  rm <path>      Remove a file or directory");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  vfs-gateway /etc/vfs-gateway/config.yaml ls /local/docs");
}

#[derive(Debug, Clone, Copy)]
enum Command {
    List,
    Stat,
    Link,
    MakeDir,
    Remove,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "ls" => Some(Command::List),
            "stat" => Some(Command::Stat),
            "link" => Some(Command::Link),
            "mkdir" => Some(Command::MakeDir),
            "rm" => Some(Command::Remove),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        print_usage();
        process::exit(1);
    }
    let config_path = PathBuf::from(&args[1]);
    let Some(command) = Command::parse(&args[2]) else {
        eprintln!("Unknown command: {}", args[2]);
        print_usage();
        process::exit(1);
    };
    let target = args[3].as_str();

    // Load configuration
    let config = match Config::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            process::exit(1);
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration error: {}", e);
        process::exit(1);
    }

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!("Loaded configuration from {:?}", config_path);

    let cache = Arc::new(CacheManager::new());
    let storages = StorageManager::new(Arc::clone(&cache));
    for entry in &config.storages {
        let driver: Arc<dyn Driver> = match &entry.driver {
            DriverConfig::Local(local) => {
                let driver = LocalDriver::new(local.root.clone(), entry.storage.clone());
                let status = driver.check_root().await;
                if !status.is_working() {
                    warn!("Storage {} is {}", entry.storage.mount_path, status);
                }
                Arc::new(driver)
            }
        };
        if let Err(e) = storages.register(driver) {
            error!("Failed to mount {}: {}", entry.storage.mount_path, e);
        }
    }
    if storages.count() == 0 {
        error!("No storages mounted");
        process::exit(1);
    }

    let hooks = Arc::new(HookRegistry::new());
    hooks.register(Arc::new(LogSubscriber));
    let dispatcher = Dispatcher::new(cache, hooks, config.cache.clone());

    let (storage, path) = match storages.resolve(target) {
        Ok(resolved) => resolved,
        Err(_) if matches!(command, Command::List) => {
            // Nothing mounted at this path itself; show the mount points
            for mount in storages.list_mounts() {
                println!("d {:>12}  {}", 0, mount);
            }
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };
    info!("{:?} {} on {}", command, path, storage.mount_path());

    let result = match command {
        Command::List => dispatcher
            .list(&storage, &path, ListArgs::default())
            .await
            .map(|objs| objs.iter().for_each(print_obj)),
        Command::Stat => dispatcher
            .get(&storage, &path, GetArgs::default())
            .await
            .map(|obj| print_obj(&obj)),
        Command::Link => dispatcher
            .link(&storage, &path, &LinkArgs::default())
            .await
            .map(|handle| {
                println!("{}", handle.link.url);
                if let Some(expiration) = handle.link.expiration {
                    println!("expires in {:?}", expiration);
                }
            }),
        Command::MakeDir => dispatcher.make_dir(&storage, &path).await,
        Command::Remove => dispatcher.remove(&storage, &path).await,
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
    Ok(())
}

fn print_obj(obj: &Obj) {
    let kind = if obj.is_dir { 'd' } else { '-' };
    let modified = obj
        .modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    println!("{} {:>12} {:>12}  {}", kind, obj.size, modified, obj.name);
}
