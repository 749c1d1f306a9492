use std::path::PathBuf;
use std::sync::Arc;

use gt1000_core::model::Category;
use gt1000_core::schema::SchemaStore;
use gt1000_core::Gt1000;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

const DEFAULT_PORT_PREFIX: &str = "GT-1000";

#[derive(clap::Args, Debug)]
pub struct ConsoleOpts {
    /// Prefix of the MIDI input/output port names to open.
    #[arg(long, default_value = DEFAULT_PORT_PREFIX)]
    port: String,
    /// Load the schema bundle from this directory instead of the one
    /// embedded in the binary.
    #[arg(long)]
    schema_dir: Option<PathBuf>,
}

impl crate::ToolRun for ConsoleOpts {
    fn run(&self) -> anyhow::Result<()> {
        let mut device = match &self.schema_dir {
            Some(dir) => {
                let schema = Arc::new(SchemaStore::load_from_dir(dir)?);
                Gt1000::open_with_schema(&self.port, schema)?
            }
            None => Gt1000::open(&self.port)?,
        };
        println!("connected as {:?}", device.device_model());

        let result = Console::new(&mut device).run();
        device.close();
        result
    }
}

/// Index the Facade uses for singleton categories; the REPL accepts `-` as
/// a friendlier way to type it.
const SINGLETON_INDEX: &str = "";

struct Console<'a> {
    device: &'a mut Gt1000,
    editor: DefaultEditor,
}

impl<'a> Console<'a> {
    fn new(device: &'a mut Gt1000) -> Self {
        Self {
            device,
            editor: DefaultEditor::new().expect("failed to initialise line editor"),
        }
    }

    fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match self.editor.readline("gt1000> ") {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);
                    let words: Vec<&str> = line.split_whitespace().collect();
                    if matches!(words[0], "quit" | "exit") {
                        return Ok(());
                    }
                    if let Err(e) = self.dispatch(&words) {
                        eprintln!("error: {e}");
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn dispatch(&mut self, words: &[&str]) -> anyhow::Result<()> {
        match words {
            ["list"] => self.cmd_list(),
            ["show", category] => self.cmd_show(category),
            ["toggle", category, index, state] => self.cmd_toggle(category, index, state),
            ["set", category, index, field, value] => self.cmd_set(category, index, field, value),
            ["type", category, index, type_name @ ..] if !type_name.is_empty() => {
                self.cmd_type(category, index, &type_name.join(" "))
            }
            ["types", category] => self.cmd_types(category),
            ["help"] => {
                print_help();
                Ok(())
            }
            _ => {
                println!("unrecognised command; try `help`");
                Ok(())
            }
        }
    }

    fn cmd_list(&mut self) -> anyhow::Result<()> {
        let snapshot = self.device.get_state();
        for category in Category::ALL {
            let Some(views) = snapshot.per_category.get(&category) else {
                println!("{category}: (not yet synced)");
                continue;
            };
            for view in views {
                let label = if view.index.is_empty() {
                    category.to_string()
                } else {
                    format!("{category} {}", view.index)
                };
                let state = if view.switch { "ON" } else { "OFF" };
                match &view.type_name {
                    Some(t) => println!("{label}: {state} [{t}]"),
                    None => println!("{label}: {state}"),
                }
            }
        }
        Ok(())
    }

    fn cmd_show(&mut self, category: &str) -> anyhow::Result<()> {
        let category = parse_category(category)?;
        let snapshot = self.device.get_state();
        let Some(views) = snapshot.per_category.get(&category) else {
            println!("{category}: (not yet synced)");
            return Ok(());
        };
        for view in views {
            let label = if view.index.is_empty() {
                category.to_string()
            } else {
                format!("{category} {}", view.index)
            };
            println!("{label}: {}", if view.switch { "ON" } else { "OFF" });
            if let Some(t) = &view.type_name {
                println!("  type: {t}");
            }
            for slider in [&view.slider1, &view.slider2].into_iter().flatten() {
                println!("  {}: {} [{}..{}]", slider.label, slider.value, slider.min, slider.max);
            }
        }
        Ok(())
    }

    fn cmd_toggle(&mut self, category: &str, index: &str, state: &str) -> anyhow::Result<()> {
        let category = parse_category(category)?;
        let on = match state {
            "on" | "ON" => true,
            "off" | "OFF" => false,
            other => anyhow::bail!("expected on|off, got {other:?}"),
        };
        self.device.toggle(category, &parse_index(index), on)?;
        Ok(())
    }

    fn cmd_set(&mut self, category: &str, index: &str, field: &str, value: &str) -> anyhow::Result<()> {
        let category = parse_category(category)?;
        let value: i64 = value.parse().map_err(|_| anyhow::anyhow!("expected an integer value, got {value:?}"))?;
        self.device.set_value(category, &parse_index(index), field, value)?;
        Ok(())
    }

    fn cmd_type(&mut self, category: &str, index: &str, type_name: &str) -> anyhow::Result<()> {
        let category = parse_category(category)?;
        self.device.set_type(category, &parse_index(index), type_name)?;
        Ok(())
    }

    fn cmd_types(&mut self, category: &str) -> anyhow::Result<()> {
        let category = parse_category(category)?;
        for type_name in self.device.list_types(category)? {
            println!("{type_name}");
        }
        Ok(())
    }
}

fn parse_category(s: &str) -> anyhow::Result<Category> {
    Category::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown category {s:?}"))
}

/// The REPL accepts `-` as a friendlier spelling of the empty index used by
/// singleton categories.
fn parse_index(s: &str) -> String {
    if s == "-" {
        SINGLETON_INDEX.to_string()
    } else {
        s.to_string()
    }
}

fn print_help() {
    println!("commands:");
    println!("  list                                  show every category's current state");
    println!("  show <category>                       show one category in detail");
    println!("  toggle <category> <index> on|off      flip a switch (index: 1.., A|B, or - for singletons)");
    println!("  set <category> <index> <field> <val>  write a raw field value");
    println!("  type <category> <index> <type name>   select a vendor type");
    println!("  types <category>                      list vendor type names for a category");
    println!("  quit                                  disconnect and exit");
}
