macro_rules! attribute_types {
    ($( $(#[$meta:meta])* $variant:ident = $code:literal => $name:literal, )+) => {
        /// RADIUS Attribute Types as defined in RFC 2865, 2866 and 2869
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AttributeType {
            $( $(#[$meta])* $variant = $code, )+
        }

        impl AttributeType {
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $( $code => Some(AttributeType::$variant), )+
                    _ => None,
                }
            }

            /// Canonical dictionary name, e.g. `"Acct-Input-Gigawords"`
            pub fn name(self) -> &'static str {
                match self {
                    $( AttributeType::$variant => $name, )+
                }
            }

            /// Look up an attribute type by its dictionary name (case-insensitive)
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case($name) {
                        return Some(AttributeType::$variant);
                    }
                )+
                None
            }
        }
    };
}

attribute_types! {
    /// User-Name (1) - RFC 2865
    UserName = 1 => "User-Name",
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4 => "NAS-IP-Address",
    /// NAS-Port (5) - RFC 2865
    NasPort = 5 => "NAS-Port",
    /// Service-Type (6) - RFC 2865
    ServiceType = 6 => "Service-Type",
    /// Framed-Protocol (7) - RFC 2865
    FramedProtocol = 7 => "Framed-Protocol",
    /// Framed-IP-Address (8) - RFC 2865
    FramedIpAddress = 8 => "Framed-IP-Address",
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18 => "Reply-Message",
    /// Class (25) - RFC 2865
    Class = 25 => "Class",
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26 => "Vendor-Specific",
    /// Session-Timeout (27) - RFC 2865
    SessionTimeout = 27 => "Session-Timeout",
    /// Idle-Timeout (28) - RFC 2865
    IdleTimeout = 28 => "Idle-Timeout",
    /// Called-Station-Id (30) - RFC 2865
    CalledStationId = 30 => "Called-Station-Id",
    /// Calling-Station-Id (31) - RFC 2865, usually the subscriber MAC
    CallingStationId = 31 => "Calling-Station-Id",
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32 => "NAS-Identifier",
    /// Proxy-State (33) - RFC 2865, echoed unmodified in replies
    ProxyState = 33 => "Proxy-State",
    /// Acct-Status-Type (40) - RFC 2866
    AcctStatusType = 40 => "Acct-Status-Type",
    /// Acct-Delay-Time (41) - RFC 2866
    AcctDelayTime = 41 => "Acct-Delay-Time",
    /// Acct-Input-Octets (42) - RFC 2866
    AcctInputOctets = 42 => "Acct-Input-Octets",
    /// Acct-Output-Octets (43) - RFC 2866
    AcctOutputOctets = 43 => "Acct-Output-Octets",
    /// Acct-Session-Id (44) - RFC 2866
    AcctSessionId = 44 => "Acct-Session-Id",
    /// Acct-Authentic (45) - RFC 2866
    AcctAuthentic = 45 => "Acct-Authentic",
    /// Acct-Session-Time (46) - RFC 2866
    AcctSessionTime = 46 => "Acct-Session-Time",
    /// Acct-Input-Packets (47) - RFC 2866
    AcctInputPackets = 47 => "Acct-Input-Packets",
    /// Acct-Output-Packets (48) - RFC 2866
    AcctOutputPackets = 48 => "Acct-Output-Packets",
    /// Acct-Terminate-Cause (49) - RFC 2866
    AcctTerminateCause = 49 => "Acct-Terminate-Cause",
    /// Acct-Multi-Session-Id (50) - RFC 2866
    AcctMultiSessionId = 50 => "Acct-Multi-Session-Id",
    /// Acct-Link-Count (51) - RFC 2866
    AcctLinkCount = 51 => "Acct-Link-Count",
    /// Acct-Input-Gigawords (52) - RFC 2869
    /// Number of times Acct-Input-Octets has wrapped around 2^32
    AcctInputGigawords = 52 => "Acct-Input-Gigawords",
    /// Acct-Output-Gigawords (53) - RFC 2869
    /// Number of times Acct-Output-Octets has wrapped around 2^32
    AcctOutputGigawords = 53 => "Acct-Output-Gigawords",
    /// Event-Timestamp (55) - RFC 2869
    EventTimestamp = 55 => "Event-Timestamp",
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61 => "NAS-Port-Type",
    /// Acct-Interim-Interval (85) - RFC 2869
    AcctInterimInterval = 85 => "Acct-Interim-Interval",
    /// NAS-Port-Id (87) - RFC 2869
    NasPortId = 87 => "NAS-Port-Id",
}

impl AttributeType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
