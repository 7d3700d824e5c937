/// Identity of the request a tool call belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: Option<String>,
    pub channel: Option<String>,
    pub session_key: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(user_id: &str, channel: &str) -> Self {
        Self {
            user_id: Some(user_id.to_owned()),
            channel: Some(channel.to_owned()),
            session_key: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_key: &str) -> Self {
        self.session_key = Some(session_key.to_owned());
        self
    }

    /// Overwrite fields with the non-empty values given; empty or missing
    /// values leave the current field unchanged.
    pub fn merge(&mut self, user_id: Option<&str>, channel: Option<&str>, session_key: Option<&str>) {
        fn set(slot: &mut Option<String>, value: Option<&str>) {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                *slot = Some(v.to_owned());
            }
        }
        set(&mut self.user_id, user_id);
        set(&mut self.channel, channel);
        set(&mut self.session_key, session_key);
    }
}
