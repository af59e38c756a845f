use teloxide::utils::command::{BotCommands, ParseError};

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Команды:")]
pub enum Command {
    #[command(description = "приветствие")]
    Start,
    #[command(description = "список команд")]
    Help,
    #[command(description = "добавить админа: /add <id>")]
    Add(u64),
    #[command(description = "удалить админа: /remove <id>")]
    Remove(u64),
    #[command(description = "показать админов")]
    Admins,
}

impl Command {
    /// Commands that change or reveal the admin set.
    pub fn is_management(&self) -> bool {
        matches!(self, Command::Add(_) | Command::Remove(_) | Command::Admins)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Parsed {
    Command(Command),
    /// A known command with missing or unparsable arguments.
    Malformed,
    NotACommand,
}

pub fn parse(text: &str, bot_name: &str) -> Parsed {
    if !text.starts_with('/') {
        return Parsed::NotACommand;
    }
    match Command::parse(text.trim(), bot_name) {
        Ok(command) => Parsed::Command(command),
        Err(ParseError::UnknownCommand(_)) | Err(ParseError::WrongBotName(_)) => {
            Parsed::NotACommand
        }
        Err(_) => Parsed::Malformed,
    }
}

pub const USAGE: &str = "Использование: /add <id>, /remove <id>, /admins";
