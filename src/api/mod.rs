//! Outbound clients for the payment providers.

pub mod bitpay;
pub mod flutterwave;
pub mod paystack;
pub mod processor;

use reqwest::Client;

use crate::{core::config::GatewayUrls, enums::GatewayName};
use processor::PaymentProcessor;

/// Credentials of the active gateway with the provider prefix stripped,
/// e.g. `paystack_api_key` becomes `api_key`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub secret_hash: Option<String>,
    pub webhook_secret: Option<String>,
}

pub fn create_processor(
    provider: GatewayName,
    credentials: &GatewayCredentials,
    urls: &GatewayUrls,
    client: Client,
) -> Box<dyn PaymentProcessor> {
    match provider {
        GatewayName::Paystack => Box::new(paystack::PaystackProcessor::new(
            client,
            &urls.paystack,
            &credentials.api_key,
        )),
        GatewayName::Flutterwave => Box::new(flutterwave::FlutterwaveProcessor::new(
            client,
            &urls.flutterwave,
            &credentials.api_key,
            credentials.secret_hash.clone().unwrap_or_default(),
        )),
        GatewayName::Bitpay => Box::new(bitpay::BitPayProcessor::new(
            client,
            &urls.bitpay,
            &credentials.api_key,
            credentials.webhook_secret.clone().unwrap_or_default(),
        )),
    }
}
