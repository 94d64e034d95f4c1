#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandName {
    Image,
    ClearImages,
    Material,
    Size,
    Weight,
    Price,
    Generate,
    Regenerate,
    Cancel,
    Status,
    Save,
    Help,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub name: CommandName,
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
}

const fn spec(
    name: CommandName,
    command: &'static str,
    usage: &'static str,
    summary: &'static str,
) -> CommandSpec {
    CommandSpec {
        name,
        command,
        usage,
        summary,
    }
}

/// Slash commands in the order `/help` lists them.
pub(crate) const COMMANDS: &[CommandSpec] = &[
    spec(CommandName::Image, "image", "/image <path>...", "add product photos"),
    spec(CommandName::ClearImages, "clear_images", "/clear_images", "drop all product photos"),
    spec(CommandName::Material, "material", "/material <text>", "set the material"),
    spec(CommandName::Size, "size", "/size <text>", "set the real dimensions"),
    spec(CommandName::Weight, "weight", "/weight <text>", "set the weight"),
    spec(CommandName::Price, "price", "/price <text>", "set the price"),
    spec(CommandName::Generate, "generate", "/generate", "render all five shots"),
    spec(CommandName::Regenerate, "regenerate", "/regenerate <id>", "render one slot again"),
    spec(CommandName::Cancel, "cancel", "/cancel", "stop the current run early"),
    spec(CommandName::Status, "status", "/status", "show inputs, slots and QC checklist"),
    spec(CommandName::Save, "save", "/save [dir]", "write finished images"),
    spec(CommandName::Help, "help", "/help", "list commands"),
    spec(CommandName::Quit, "quit", "/quit", "leave the session"),
];

pub(crate) fn find_command(command: &str) -> Option<CommandName> {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.name)
}

/// One line per command, usage column aligned.
pub fn help_text() -> String {
    let width = COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    COMMANDS
        .iter()
        .map(|spec| format!("  {:<width$}  {}", spec.usage, spec.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::{find_command, help_text, CommandName, COMMANDS};

    #[test]
    fn every_command_is_listed_in_help() {
        let help = help_text();
        assert_eq!(help.lines().count(), COMMANDS.len());
        for spec in COMMANDS {
            assert!(help.contains(spec.usage), "missing {}", spec.usage);
        }
    }

    #[test]
    fn lookup_is_exact() {
        assert_eq!(find_command("clear_images"), Some(CommandName::ClearImages));
        assert_eq!(find_command("clear"), None);
    }
}
