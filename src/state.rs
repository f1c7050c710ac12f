use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::utils::mail::MailSender;
use crate::utils::payment::PaymentProvider;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub payments: Arc<dyn PaymentProvider>,
    pub mailer: Arc<dyn MailSender>,
}
