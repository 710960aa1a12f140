pub mod desktop;
pub mod discord;
pub mod dispatcher;
pub mod error;
pub mod fanout;

pub use desktop::DesktopNotifier;
pub use discord::DiscordDm;
pub use dispatcher::{ChannelDispatcher, DirectMessenger, LocalNotifier};
pub use error::ChannelError;
pub use fanout::FanoutDispatcher;
