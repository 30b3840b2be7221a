// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Network interface report

use std::{
    collections::BTreeMap,
    net::{IpAddr, SocketAddrV4, SocketAddrV6},
};

use nix::{
    ifaddrs::getifaddrs,
    net::if_::InterfaceFlags,
    sys::socket::SockaddrStorage,
};
use serde::Serialize;

use crate::{DiagnosticsError, DiagnosticsResult};

/// Interface name to the addresses bound on it
pub type NetworkReport = BTreeMap<String, Vec<InterfaceAddress>>;

/// IP version of an interface address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressFamily {
    /// IP version 4
    IPv4,
    /// IP version 6
    IPv6,
}

/// One address bound on an interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceAddress {
    /// Bound address
    pub address: IpAddr,
    /// Network mask, when reported
    pub netmask: Option<IpAddr>,
    /// IP version
    pub family: AddressFamily,
    /// Hardware address of the interface, when known
    pub mac: Option<String>,
    /// Whether this is a loopback interface
    pub internal: bool,
    /// IPv6 scope id
    pub scope_id: Option<u32>,
}

pub(crate) fn collect() -> DiagnosticsResult<NetworkReport> {
    let addresses = getifaddrs().map_err(|source| DiagnosticsError::Os {
        what: "network interfaces",
        source,
    })?;

    let mut report = NetworkReport::new();
    let mut macs = BTreeMap::new();

    for entry in addresses {
        let Some(storage) = entry.address.as_ref() else {
            continue;
        };

        if let Some(mac) = hardware_address(storage) {
            macs.insert(entry.interface_name, mac);
            continue;
        }

        let Some((address, scope_id)) = ip_address(storage) else {
            continue;
        };

        report
            .entry(entry.interface_name)
            .or_default()
            .push(InterfaceAddress {
                family: if address.is_ipv4() {
                    AddressFamily::IPv4
                } else {
                    AddressFamily::IPv6
                },
                address,
                netmask: entry
                    .netmask
                    .as_ref()
                    .and_then(ip_address)
                    .map(|(mask, _)| mask),
                mac: None,
                internal: entry.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                scope_id,
            });
    }

    for (name, bound) in &mut report {
        if let Some(mac) = macs.get(name) {
            for address in bound {
                address.mac = Some(mac.clone());
            }
        }
    }

    Ok(report)
}

fn ip_address(storage: &SockaddrStorage) -> Option<(IpAddr, Option<u32>)> {
    if let Some(v4) = storage.as_sockaddr_in() {
        return Some((IpAddr::V4(*SocketAddrV4::from(*v4).ip()), None));
    }
    storage.as_sockaddr_in6().map(|v6| {
        let v6 = SocketAddrV6::from(*v6);
        let scope = (v6.scope_id() != 0).then_some(v6.scope_id());
        (IpAddr::V6(*v6.ip()), scope)
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn hardware_address(storage: &SockaddrStorage) -> Option<String> {
    storage
        .as_link_addr()
        .and_then(nix::sys::socket::LinkAddr::addr)
        .map(format_mac)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn hardware_address(_storage: &SockaddrStorage) -> Option<String> {
    None
}

fn format_mac(octets: [u8; 6]) -> String {
    octets
        .iter()
        .map(|octet| format!("{octet:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn formats_mac_lowercase_colon_separated() {
        assert_eq!(
            format_mac([0x02, 0x42, 0xAC, 0x11, 0x00, 0x02]),
            "02:42:ac:11:00:02"
        );
    }

    #[test]
    fn reports_loopback_as_internal() {
        let report = collect().unwrap();
        let loopback = report
            .values()
            .flatten()
            .find(|address| address.address == IpAddr::V4(Ipv4Addr::LOCALHOST));

        // Sandboxed CI may have no loopback interface configured
        if let Some(loopback) = loopback {
            assert!(loopback.internal);
            assert_eq!(loopback.family, AddressFamily::IPv4);
        }
    }

    #[test]
    fn serializes_address_fields() {
        let address = InterfaceAddress {
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            netmask: Some(IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0))),
            family: AddressFamily::IPv4,
            mac: Some("02:42:ac:11:00:02".to_string()),
            internal: false,
            scope_id: None,
        };
        let json = serde_json::to_value(&address).unwrap();
        assert_eq!(json["address"], "10.0.0.5");
        assert_eq!(json["family"], "IPv4");
        assert_eq!(json["scopeId"], serde_json::Value::Null);
    }
}
