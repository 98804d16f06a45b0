// Runs the bridge against a scripted in-process extension
// init -> accounts -> sign, driven by a config file

#[cfg(not(target_arch = "wasm32"))]
mod sim {
    use anyhow::Result;
    use std::env;
    use std::path::Path;
    use std::rc::Rc;

    use lunie_extension_bridge::config::{ConfigFile, SimulatorConfig};
    use lunie_extension_bridge::loopback::{LoopbackWindow, MockExtension, SignBehaviour};
    use lunie_extension_bridge::{Account, ExtensionBridge};

    fn default_simulator() -> SimulatorConfig {
        SimulatorConfig {
            page_origin: "https://app.lunie.io".to_string(),
            accounts: vec![Account::new(
                "cosmos1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5lzv7xu",
                "demo",
            )],
            reject_signatures: false,
            sign_message: r#"{"chain_id":"cosmoshub-3","msgs":[]}"#.to_string(),
        }
    }

    pub async fn run() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();

        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "bridge.toml".to_string());
        let config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            ConfigFile::load(&config_path)?
        } else {
            tracing::info!("No config at {}, using defaults", config_path);
            ConfigFile::default()
        };
        config.validate()?;

        let simulator = config.simulator.clone().unwrap_or_else(default_simulator);
        let sign = if simulator.reject_signatures {
            SignBehaviour::Reject
        } else {
            SignBehaviour::Approve {
                signature: vec![0x5a; 64],
                public_key: vec![0x02; 33],
            }
        };

        let window = Rc::new(LoopbackWindow::with_extension(
            simulator.page_origin.clone(),
            MockExtension::new(simulator.accounts.clone(), sign),
        ));
        let bridge = ExtensionBridge::new(window, &config.bridge);
        bridge.listen()?;
        tracing::info!(
            "Bridge listening on {} (target origin {})",
            bridge.window().origin(),
            config.bridge.target_origin
        );

        bridge.window().announce()?;
        bridge.window().pump();
        tracing::info!(
            "Extension available: {}, accounts: {:?}",
            bridge.sink().is_extension_available(),
            bridge.sink().accounts()
        );

        let Some(sender) = bridge.sink().accounts().into_iter().next() else {
            anyhow::bail!("Extension reported no accounts to sign with");
        };

        let (result, _) = futures::join!(
            bridge.sign(&simulator.sign_message, &sender.address),
            async { bridge.window().pump() }
        );

        match result {
            Ok(signature) => tracing::info!(
                "Signed by {}: signature={} publicKey={}",
                sender.name,
                hex::encode(&signature.signature),
                hex::encode(&signature.public_key)
            ),
            Err(e) => tracing::warn!("Signing failed: {}", e),
        }

        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    sim::run().await
}

// Dummy main for wasm builds
#[cfg(target_arch = "wasm32")]
fn main() {}
