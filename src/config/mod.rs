mod settings;

pub use settings::{
    DatabaseConfig, EmailConfig, JwtConfig, ServerConfig, Settings, SmsConfig, WebSocketConfig,
};
