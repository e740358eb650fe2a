//! Landing-IP classification from ISP and reverse-hostname keywords.
//!
//! Pure string matching, applied whenever the geolocation provider did not
//! classify the address itself. Rule groups are ordered: hostname evidence of
//! a datacenter wins over anything the ISP name suggests.

use sbp_types::IpType;

/// Hostname substrings that identify datacenter machines.
const HOST_HOSTING: &[&str] = &[
    "ec2",
    "compute",
    "cloud",
    "vps",
    "server",
    "hosting",
    "datacenter",
    "colocation",
    "azure",
    "googleusercontent",
    "amazonaws",
    "linode",
    "vultr",
    "digitalocean",
    "oracle",
    "alibaba",
    "tencent",
    "kamatera",
    "hetzner",
    "ovh",
    "choopa",
    "leaseweb",
    "m247",
    "fly.io",
    "cloudflare",
    "fastly",
    "akamai",
    "cdn",
];

/// ISP substrings that identify hosting companies.
const ISP_HOSTING: &[&str] = &[
    "cloud",
    "vps",
    "data",
    "hosting",
    "server",
    "solution",
    "tech",
    "network",
    "amazon",
    "google",
    "microsoft",
    "oracle",
    "aliyun",
    "tencent",
    "digitalocean",
    "vultr",
    "linode",
    "hetzner",
    "ovh",
    "leaseweb",
    "choopa",
    "m247",
    "fly.io",
    "cloudflare",
    "fastly",
    "akamai",
    "cdn",
];

/// ISP substrings that identify consumer carriers.
const ISP_CONSUMER: &[&str] = &[
    "telecom",
    "mobile",
    "cable",
    "broadband",
    "internet",
    "comcast",
    "verizon",
    "spectrum",
    "t-mobile",
    "vodafone",
    "att",
    "orange",
    "deutsche telekom",
    "telefonica",
    "bt",
    "virgin",
    "sky",
    "charter",
    "cox",
    "century",
];

/// Classify from `(isp, hostname)`. Returns `None` when both inputs are
/// empty; otherwise falls through the rule groups and defaults to Business.
pub fn infer_ip_type(isp: &str, hostname: &str) -> Option<IpType> {
    if isp.is_empty() && hostname.is_empty() {
        return None;
    }

    let isp = isp.to_lowercase();
    let hostname = hostname.to_lowercase();

    if HOST_HOSTING.iter().any(|k| hostname.contains(k)) {
        return Some(IpType::Hosting);
    }
    if ISP_HOSTING.iter().any(|k| isp.contains(k)) {
        return Some(IpType::Hosting);
    }
    if ISP_CONSUMER.iter().any(|k| isp.contains(k)) {
        return Some(IpType::Isp);
    }
    Some(IpType::Business)
}
