use crate::domain::entities::{Command, CommandRegistry};
use crate::plugins::Plugin;

/// Registry of every command the bot answers to, built-ins included
pub struct CommandService {
    registry: CommandRegistry,
    prefix: String,
}

impl CommandService {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            registry: CommandRegistry::new(),
            prefix: prefix.into(),
        }
    }

    pub fn register(&mut self, command: Command) {
        self.registry.register(command);
    }

    /// `help` and `version`, answered by the dispatcher itself
    pub fn register_defaults(&mut self) {
        self.register(
            Command::new("help")
                .with_description("Show help message")
                .with_usage("/help [command]"),
        );
        self.register(Command::new("version").with_description("Show bot version"));
    }

    /// Register a plugin's commands, tagged with the plugin's name
    pub fn register_plugin_commands(&mut self, plugin: &dyn Plugin) {
        for command in plugin.commands() {
            if self.registry.get(&command.name).is_some() {
                tracing::warn!(
                    command = %command.name,
                    plugin = plugin.name(),
                    "command already registered, skipping"
                );
                continue;
            }
            self.register(command.with_plugin(plugin.name()));
        }
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.registry.find(name)
    }

    pub fn get_help(&self, command: Option<&str>) -> String {
        if let Some(name) = command {
            if let Some(cmd) = self.registry.find(name) {
                let mut help = format!(
                    "{}{} - {}",
                    self.prefix,
                    cmd.name,
                    cmd.description.as_deref().unwrap_or("No description")
                );
                if let Some(usage) = &cmd.usage {
                    help.push_str(&format!("\nUsage: {}", usage));
                }
                if !cmd.aliases.is_empty() {
                    help.push_str(&format!("\nAliases: {}", cmd.aliases.join(", ")));
                }
                return help;
            }
            return format!("Command {}{} not found", self.prefix, name);
        }

        let mut commands: Vec<&Command> = self.registry.all().collect();
        commands.sort_by(|a, b| a.name.cmp(&b.name));

        let mut help = "Available commands:\n".to_string();
        for cmd in commands {
            help.push_str(&format!(
                "  {}{} - {}\n",
                self.prefix,
                cmd.name,
                cmd.description.as_deref().unwrap_or("")
            ));
        }
        help
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
