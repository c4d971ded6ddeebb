//! Backend authentication requests (`R`), distinguished by a 4-byte
//! subtype: 0 = Ok, 10 = SASL, 11 = SASL continue, 12 = SASL final.

use crate::io::{BufMutExt, Encode};

#[derive(Debug)]
pub enum Authentication<'a> {
    /// The authentication exchange is successfully completed.
    Ok,

    /// The frontend must initiate a SASL negotiation using one of the
    /// listed mechanisms.
    Sasl { mechanisms: &'a [&'a str] },

    /// Challenge data for the next step of the SASL negotiation; here the
    /// SCRAM server-first message.
    SaslContinue(&'a str),

    /// Final SASL data; here the SCRAM server signature `v=…`.
    SaslFinal(&'a str),
}

impl Encode for Authentication<'_> {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(b'R');

        buf.put_length_prefixed(|buf| match self {
            Authentication::Ok => {
                buf.extend_from_slice(&0_i32.to_be_bytes());
            }

            Authentication::Sasl { mechanisms } => {
                buf.extend_from_slice(&10_i32.to_be_bytes());

                for mechanism in *mechanisms {
                    buf.put_str_nul(mechanism);
                }

                // the mechanism list carries its own terminator
                buf.push(0);
            }

            Authentication::SaslContinue(data) => {
                buf.extend_from_slice(&11_i32.to_be_bytes());
                buf.extend_from_slice(data.as_bytes());
            }

            Authentication::SaslFinal(data) => {
                buf.extend_from_slice(&12_i32.to_be_bytes());
                buf.extend_from_slice(data.as_bytes());
            }
        });
    }
}
