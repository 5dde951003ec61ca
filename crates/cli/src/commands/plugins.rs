//! `conduit plugins`: List plugins, executors, and capabilities.

use conduit::bootstrap;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let plugins = conduit_plugins::default_registry(&config.plugins)?;
    let capabilities = bootstrap::capabilities(&config)?;
    let first = plugins.first_run_steps();

    println!("Plugins");
    println!("=======");
    for descriptor in plugins.descriptors() {
        let marker = if first.contains(&descriptor.step()) {
            " (always first)"
        } else {
            ""
        };
        println!("  {:<28} {}{marker}", descriptor.step().to_string(), descriptor.description);
    }

    println!();
    println!("Capabilities");
    println!("============");
    for capability in capabilities.descriptors() {
        if capability.aliases.is_empty() {
            println!("  {}", capability.id);
        } else {
            println!("  {} (aliases: {})", capability.id, capability.aliases.join(", "));
        }
    }

    Ok(())
}
