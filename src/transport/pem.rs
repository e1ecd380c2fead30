//! Utilities for reading PEM-encoded certificates, as needed when a [`crate::topology::
//! TopologyNode`] carries an explicit certificate to trust.

use std::{fs::File, io, io::Read, path::Path};

use tokio_rustls::rustls::Certificate;

/// Read the file at `path` into memory as a vector of PEM-encoded `CERTIFICATE`s, silently
/// skipping any entries in the file which are not labeled `CERTIFICATE`.
pub fn read_certificates(path: impl AsRef<Path>) -> Result<Vec<Certificate>, io::Error> {
    let mut file = File::open(&path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    let mut certificates = Vec::new();
    for pem::Pem { contents, tag } in pem::parse_many(contents) {
        if tag == "CERTIFICATE" {
            certificates.push(Certificate(contents));
        }
    }
    Ok(certificates)
}

/// Parse a single in-memory DER-encoded certificate, as supplied by a topology lookup.
pub fn certificate_from_der(der: Vec<u8>) -> Certificate {
    Certificate(der)
}
