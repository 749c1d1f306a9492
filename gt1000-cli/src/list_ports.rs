const DEFAULT_PORT_PREFIX: &str = "GT-1000";

#[derive(clap::Args, Debug)]
pub struct ListPortsOpts {
    /// Name prefix that `console` would match against; marked with `*` below.
    #[arg(default_value = DEFAULT_PORT_PREFIX)]
    prefix: String,
}

impl crate::ToolRun for ListPortsOpts {
    fn run(&self) -> anyhow::Result<()> {
        let ports = gt1000_core::transport::list_output_ports()?;
        if ports.is_empty() {
            println!("no MIDI output ports found");
            return Ok(());
        }
        for name in ports {
            if name.starts_with(&self.prefix) {
                println!("* {name}");
            } else {
                println!("  {name}");
            }
        }
        Ok(())
    }
}
