use crate::models::{
    delivery::ChannelKind,
    notification::{Category, Priority},
};

/// Channels tried in rotation by scheduled retries.
const RETRY_ROTATION: [ChannelKind; 2] = [ChannelKind::Push, ChannelKind::Realtime];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsEligibility {
    /// SMS follows push and realtime in the immediate tier.
    Immediate,
    /// One SMS attempt once the retry ladder is used up.
    AfterExhaustion,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPlan {
    pub channels: Vec<ChannelKind>,
    pub sms: SmsEligibility,
}

impl EscalationPlan {
    /// Channel used by retry `k` (1-based).
    pub fn retry_channel(&self, retry_number: usize) -> ChannelKind {
        RETRY_ROTATION[retry_number.saturating_sub(1) % RETRY_ROTATION.len()]
    }
}

pub struct EscalationPolicy;

impl EscalationPolicy {
    pub fn plan(category: Category, priority: Priority) -> EscalationPlan {
        let sms = match (priority, category) {
            (Priority::Urgent, _) => SmsEligibility::Immediate,
            (Priority::High, Category::RideRequest) => SmsEligibility::Immediate,
            (Priority::High, _) => SmsEligibility::AfterExhaustion,
            (Priority::Normal | Priority::Low, _) => SmsEligibility::Never,
        };

        let mut channels = vec![ChannelKind::Push, ChannelKind::Realtime];
        if sms == SmsEligibility::Immediate {
            channels.push(ChannelKind::Sms);
        }

        EscalationPlan { channels, sms }
    }
}
