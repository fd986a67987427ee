//! String-backed enums for the status and kind columns stored as text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("{} is not a valid {}", other, stringify!($name))),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a single payment attempt.
    PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Abandoned => "abandoned",
    }
);

text_enum!(
    /// What a payment is for, stored in `payments.meta_info.payment_type`.
    PaymentType {
        WalletTopUp => "wallet_top_up",
        OrderPayment => "order_payment",
    }
);

text_enum!(
    /// Payment methods configurable from the back-office.
    PaymentMethod {
        Bacs => "bacs",
        Check => "check",
        Cod => "cod",
        Gateway => "gateway",
    }
);

text_enum!(
    OrderStatus {
        Pending => "pending",
        Paid => "paid",
        Processing => "processing",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
    }
);

text_enum!(
    TransactionType {
        Credit => "credit",
        Debit => "debit",
        Payment => "payment",
        Withdrawal => "withdrawal",
    }
);

text_enum!(
    UserRole {
        Customer => "customer",
        Admin => "admin",
        SuperAdmin => "super_admin",
    }
);

text_enum!(
    /// Third-party gateways a processor exists for.
    GatewayName {
        Bitpay => "bitpay",
        Flutterwave => "flutterwave",
        Paystack => "paystack",
    }
);

text_enum!(
    NavItemType {
        Category => "category",
        Tag => "tag",
        Page => "page",
        Custom => "custom",
    }
);

text_enum!(
    GeneralSettingsKey {
        SiteTitle => "site_title",
        Tagline => "tagline",
        AdminEmail => "admin_email",
        Timezone => "timezone",
        WeekStartsOn => "week_starts_on",
        PlatformUrl => "platform_url",
        SiteUrl => "site_url",
        Currency => "currency",
        CurrencyPosition => "currency_position",
        ThousandSeparator => "thousand_separator",
        DecimalSeparator => "decimal_separator",
        NumberOfDecimals => "number_of_decimals",
    }
);

text_enum!(
    PaymentMethodSettingKey {
        Enabled => "enabled",
        Title => "title",
        Description => "description",
        AccountName => "account_name",
        AccountNumber => "account_number",
        BankName => "bank_name",
        SortCode => "sort_code",
        Iban => "iban",
        BicSwift => "bic_swift",
        EnableForShipping => "enable_for_shipping",
        AcceptVirtualOrders => "accept_virtual_orders",
        Provider => "provider",
        BitpayApiKey => "bitpay_api_key",
        BitpayWebhookSecret => "bitpay_webhook_secret",
        FlutterwaveApiKey => "flutterwave_api_key",
        FlutterwaveSecretHash => "flutterwave_secret_hash",
        PaystackApiKey => "paystack_api_key",
    }
);

text_enum!(
    /// Where the currency symbol sits relative to a formatted amount.
    CurrencyPosition {
        Left => "left",
        Right => "right",
        LeftSpace => "left_space",
        RightSpace => "right_space",
    }
);

text_enum!(
    PublishStatus {
        Published => "published",
        Draft => "draft",
    }
);

text_enum!(
    /// How a shopper settles an order at checkout. Offline methods leave the
    /// order pending until staff mark it paid.
    CheckoutMethod {
        Wallet => "wallet",
        Gateway => "gateway",
        Bacs => "bacs",
        Check => "check",
        Cod => "cod",
    }
);

impl CheckoutMethod {
    pub fn offline_method(&self) -> Option<PaymentMethod> {
        match self {
            CheckoutMethod::Bacs => Some(PaymentMethod::Bacs),
            CheckoutMethod::Check => Some(PaymentMethod::Check),
            CheckoutMethod::Cod => Some(PaymentMethod::Cod),
            CheckoutMethod::Wallet | CheckoutMethod::Gateway => None,
        }
    }
}

impl UserRole {
    pub fn is_staff(&self) -> bool {
        matches!(self, UserRole::Admin | UserRole::SuperAdmin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_text_back_into_variants() {
        assert_eq!("completed".parse::<PaymentStatus>(), Ok(PaymentStatus::Completed));
        assert_eq!("order_payment".parse::<PaymentType>(), Ok(PaymentType::OrderPayment));
        assert!("PAID".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serde_uses_the_stored_text() {
        let json = serde_json::to_string(&PaymentType::WalletTopUp).unwrap();
        assert_eq!(json, "\"wallet_top_up\"");
        let json = serde_json::to_string(&UserRole::SuperAdmin).unwrap();
        assert_eq!(json, "\"super_admin\"");
    }
}
