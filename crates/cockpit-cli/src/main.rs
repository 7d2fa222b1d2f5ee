//! 트레이딩 봇 조종석 CLI.
//!
//! # 사용 예시
//!
//! ```bash
//! # 테스트넷 키로 로그인 (BINANCE_API_KEY / BINANCE_API_SECRET 환경변수도 사용 가능)
//! cockpit login --key <KEY> --secret <SECRET>
//!
//! # 잔고, 체결 내역, 시세
//! cockpit balance
//! cockpit trades -s BTCUSDT
//! cockpit candles -s ETHUSDT -i 1h -l 24
//!
//! # 지정가 매수
//! cockpit order -s BTCUSDT --side BUY -q 0.001 --type LIMIT --price 42000
//!
//! # 봇 백엔드를 거친 시장가 주문
//! cockpit order -s BTCUSDT --side SELL -q 0.002 --via-bot
//!
//! # 봇 제어와 실시간 상태 보기
//! cockpit bot start --symbols BTCUSDT,ETHUSDT --mode micro
//! cockpit bot positions
//! cockpit watch
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::debug;

use cockpit_core::{CockpitConfig, FileStore};
use cockpit_session::Session;

mod commands;

#[derive(Parser)]
#[command(name = "cockpit")]
#[command(about = "Trading bot cockpit - 거래소 계좌와 봇 백엔드를 한 곳에서", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// API 키 검증 후 로그인 (자격증명 저장)
    Login {
        /// API 키 (기본: BINANCE_API_KEY)
        #[arg(long, env = "BINANCE_API_KEY", hide_env_values = true)]
        key: String,

        /// API 시크릿 (기본: BINANCE_API_SECRET)
        #[arg(long, env = "BINANCE_API_SECRET", hide_env_values = true)]
        secret: String,

        /// 실거래 모드 (지정하지 않으면 테스트넷)
        #[arg(long, default_value = "false")]
        live: bool,
    },

    /// 로그아웃 (저장된 자격증명 삭제)
    Logout,

    /// 현물 잔고 조회
    Balance,

    /// 체결 내역 조회
    Trades {
        /// 심볼 (기본: COCKPIT_SYMBOL)
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// 24시간 시세 조회
    Ticker {
        #[arg(short, long)]
        symbol: Option<String>,
    },

    /// 캔들 조회
    Candles {
        #[arg(short, long)]
        symbol: Option<String>,

        /// 캔들 간격 (1m, 5m, 1h, 1d ...)
        #[arg(short, long, default_value = "1h")]
        interval: String,

        /// 개수 (최대 1000)
        #[arg(short, long, default_value = "24")]
        limit: u32,
    },

    /// 주문 제출
    Order {
        #[arg(short, long)]
        symbol: String,

        /// BUY 또는 SELL
        #[arg(long)]
        side: String,

        /// 수량
        #[arg(short, long)]
        quantity: Decimal,

        /// MARKET 또는 LIMIT
        #[arg(long = "type", default_value = "MARKET")]
        order_type: String,

        /// 지정가 (LIMIT 주문 필수)
        #[arg(long)]
        price: Option<Decimal>,

        /// 거래소 대신 봇 백엔드로 시장가 주문
        #[arg(long, default_value = "false", conflicts_with = "price")]
        via_bot: bool,
    },

    /// 봇 제어
    Bot {
        #[command(subcommand)]
        action: BotAction,
    },

    /// 실시간 상태 보기 (Ctrl-C로 종료)
    Watch,
}

#[derive(Subcommand)]
enum BotAction {
    /// 봇 시작
    Start {
        /// 거래 심볼 (쉼표 구분)
        #[arg(long, value_delimiter = ',', default_value = "BTCUSDT,ETHUSDT")]
        symbols: Vec<String>,

        /// 실행 모드 (auto, micro, production)
        #[arg(long, default_value = "auto")]
        mode: String,

        /// 전략 이름
        #[arg(long, default_value = "eclipse")]
        strategy: String,

        /// 주문 수량
        #[arg(long, default_value = "0.002")]
        amount: f64,

        /// 실주문 실행 (지정하지 않으면 드라이런)
        #[arg(long, default_value = "false")]
        live: bool,
    },

    /// 봇 정지
    Stop,

    /// 봇 상태 요약
    Status,

    /// 봇 보유 포지션
    Positions,

    /// 봇 체결 내역
    Trades,

    /// 봇 계좌 잔고
    Balance,

    /// 봇 백엔드 현재가
    Price {
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (없어도 에러 안남)
    dotenvy::dotenv().ok();

    // 트레이싱 초기화
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cockpit=info,cockpit_session=info,cockpit_exchange=info".into()
            }),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = CockpitConfig::from_env().context("설정 로드 실패")?;
    debug!(bot_api_url = %config.bot_api_url, testnet = config.testnet, "설정 로드 완료");

    let store = Arc::new(FileStore::new(&config.state_dir));
    let session = Session::new(config, store);

    match cli.command {
        Commands::Login { key, secret, live } => {
            commands::account::login(&session, key, secret, !live).await?;
        }
        Commands::Logout => commands::account::logout(&session).await?,
        Commands::Balance => commands::account::balance(&session).await?,
        Commands::Trades { symbol } => {
            let symbol = symbol.unwrap_or_else(|| session.config().symbol.clone());
            commands::account::trades(&session, &symbol).await?;
        }
        Commands::Ticker { symbol } => {
            let symbol = symbol.unwrap_or_else(|| session.config().symbol.clone());
            commands::market::ticker(&session, &symbol).await?;
        }
        Commands::Candles {
            symbol,
            interval,
            limit,
        } => {
            let symbol = symbol.unwrap_or_else(|| session.config().symbol.clone());
            commands::market::candles(&session, &symbol, &interval, limit).await?;
        }
        Commands::Order {
            symbol,
            side,
            quantity,
            order_type,
            price,
            via_bot,
        } => {
            if via_bot {
                commands::market::order_via_bot(&session, symbol, &side, quantity).await?;
            } else {
                commands::market::order(&session, symbol, &side, quantity, &order_type, price)
                    .await?;
            }
        }
        Commands::Bot { action } => match action {
            BotAction::Start {
                symbols,
                mode,
                strategy,
                amount,
                live,
            } => {
                let request = cockpit_exchange::BotStartRequest {
                    symbols,
                    mode,
                    strategy,
                    amount,
                    dry_run: !live,
                    ..Default::default()
                };
                commands::bot::start(&session, &request).await?;
            }
            BotAction::Stop => commands::bot::stop(&session).await?,
            BotAction::Status => commands::bot::status(&session).await?,
            BotAction::Positions => commands::bot::positions(&session).await?,
            BotAction::Trades => commands::bot::trades(&session).await?,
            BotAction::Balance => commands::bot::balance(&session).await?,
            BotAction::Price { symbol } => {
                let symbol = symbol.unwrap_or_else(|| session.config().symbol.clone());
                commands::bot::price(&session, &symbol).await?;
            }
        },
        Commands::Watch => commands::watch::run(&session).await?,
    }

    Ok(())
}
