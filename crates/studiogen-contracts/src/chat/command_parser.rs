use super::command_registry::{find_command, CommandName};
use crate::product::ProductAttributes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeField {
    Material,
    Size,
    Weight,
    Price,
}

impl AttributeField {
    pub fn label(self) -> &'static str {
        match self {
            Self::Material => "Material",
            Self::Size => "Size",
            Self::Weight => "Weight",
            Self::Price => "Price",
        }
    }

    /// Stores `value`; blank text clears the field.
    pub fn apply(self, attributes: &mut ProductAttributes, value: &str) {
        let value = Some(value.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        let slot = match self {
            Self::Material => &mut attributes.material,
            Self::Size => &mut attributes.size,
            Self::Weight => &mut attributes.weight,
            Self::Price => &mut attributes.price,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Noop,
    AddImages(Vec<String>),
    ClearImages,
    SetAttribute { field: AttributeField, value: String },
    Generate,
    Regenerate(String),
    Cancel,
    Status,
    Save(Option<String>),
    Help,
    Quit,
    Unknown { command: String, arg: String },
    Text(String),
}

fn split_paths(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    // Unbalanced quotes fall back to whitespace splitting.
    shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect())
        .into_iter()
        .filter(|value| !value.is_empty())
        .collect()
}

fn single_arg(arg: &str) -> String {
    split_paths(arg).join(" ")
}

pub fn parse_command(text: &str) -> ChatCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ChatCommand::Noop;
    }
    let Some(tail) = trimmed.strip_prefix('/') else {
        return ChatCommand::Text(trimmed.to_string());
    };
    let command_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ChatCommand::Text(trimmed.to_string());
    }

    let command = tail[..command_len].to_ascii_lowercase();
    let arg = tail[command_len..].trim();
    let Some(name) = find_command(&command) else {
        return ChatCommand::Unknown {
            command,
            arg: arg.to_string(),
        };
    };

    let attribute = |field| ChatCommand::SetAttribute {
        field,
        // Attribute text goes into prompts as typed.
        value: arg.to_string(),
    };
    match name {
        CommandName::Image => ChatCommand::AddImages(split_paths(arg)),
        CommandName::ClearImages => ChatCommand::ClearImages,
        CommandName::Material => attribute(AttributeField::Material),
        CommandName::Size => attribute(AttributeField::Size),
        CommandName::Weight => attribute(AttributeField::Weight),
        CommandName::Price => attribute(AttributeField::Price),
        CommandName::Generate => ChatCommand::Generate,
        CommandName::Regenerate => ChatCommand::Regenerate(single_arg(arg)),
        CommandName::Cancel => ChatCommand::Cancel,
        CommandName::Status => ChatCommand::Status,
        CommandName::Save => {
            let dir = single_arg(arg);
            ChatCommand::Save((!dir.is_empty()).then_some(dir))
        }
        CommandName::Help => ChatCommand::Help,
        CommandName::Quit => ChatCommand::Quit,
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command, AttributeField, ChatCommand};
    use crate::product::ProductAttributes;

    #[test]
    fn image_paths_honor_quotes() {
        assert_eq!(
            parse_command("/image front.jpg \"/tmp/side view.png\""),
            ChatCommand::AddImages(vec![
                "front.jpg".to_string(),
                "/tmp/side view.png".to_string()
            ])
        );
        assert_eq!(
            parse_command("/image it's.png"),
            ChatCommand::AddImages(vec!["it's.png".to_string()])
        );
        assert_eq!(parse_command("/image"), ChatCommand::AddImages(Vec::new()));
    }

    #[test]
    fn attribute_text_is_kept_verbatim() {
        assert_eq!(
            parse_command("/material 100% Cotton, \"organic\""),
            ChatCommand::SetAttribute {
                field: AttributeField::Material,
                value: "100% Cotton, \"organic\"".to_string(),
            }
        );
        assert_eq!(
            parse_command("  /SIZE   10x10 cm "),
            ChatCommand::SetAttribute {
                field: AttributeField::Size,
                value: "10x10 cm".to_string(),
            }
        );
    }

    #[test]
    fn regenerate_and_save_take_one_argument() {
        assert_eq!(
            parse_command("/regenerate 3"),
            ChatCommand::Regenerate("3".to_string())
        );
        assert_eq!(
            parse_command("/save \"/tmp/out dir\""),
            ChatCommand::Save(Some("/tmp/out dir".to_string()))
        );
        assert_eq!(parse_command("/save"), ChatCommand::Save(None));
    }

    #[test]
    fn bare_commands() {
        for (input, expected) in [
            ("/generate", ChatCommand::Generate),
            ("/cancel", ChatCommand::Cancel),
            ("/status", ChatCommand::Status),
            ("/clear_images", ChatCommand::ClearImages),
            ("/help", ChatCommand::Help),
            ("/QUIT", ChatCommand::Quit),
        ] {
            assert_eq!(parse_command(input), expected);
        }
    }

    #[test]
    fn blank_plain_and_unknown_input() {
        assert_eq!(parse_command("   "), ChatCommand::Noop);
        assert_eq!(
            parse_command("make it blue"),
            ChatCommand::Text("make it blue".to_string())
        );
        assert_eq!(parse_command("/ hi"), ChatCommand::Text("/ hi".to_string()));
        assert_eq!(
            parse_command("/magic foo bar"),
            ChatCommand::Unknown {
                command: "magic".to_string(),
                arg: "foo bar".to_string(),
            }
        );
    }

    #[test]
    fn apply_sets_and_clears_fields() {
        let mut attributes = ProductAttributes::default();
        AttributeField::Weight.apply(&mut attributes, " 500g ");
        AttributeField::Price.apply(&mut attributes, "$49.99");
        assert_eq!(attributes.weight(), "500g");
        assert_eq!(attributes.price(), "$49.99");

        AttributeField::Weight.apply(&mut attributes, "  ");
        assert_eq!(attributes.weight, None);
    }
}
