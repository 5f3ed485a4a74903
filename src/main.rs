use anyhow::{Context, Result};
use item_player::utils::logging;
use item_player::{Config, LineTransport, Player, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志（写到 stderr，stdout 留给宿主消息）
    logging::init(&config.log_filter);
    logging::log_startup(&config);

    // 运行播放器，直到宿主关闭标准输入
    let (runtime, _ui) = Runtime::new(Player::new(config), LineTransport::stdio());
    let player = runtime.run().await.context("播放器运行失败")?;

    logging::log_shutdown(player.session().state());
    Ok(())
}
