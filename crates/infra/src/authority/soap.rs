//! SOAP adapter for the offline reception and authorization services.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use einvoice_fiscal::{AccessKey, Environment};

use super::xml::Node;
use super::{
    AuthorityMessage, Authorization, AuthorizationResponse, AuthorizationState,
    ReceptionResponse, ReceptionState, TaxAuthorityClient, TransportError,
};

const RECEPTION_NS: &str = "http://ec.gob.sri.ws.recepcion";
const AUTHORIZATION_NS: &str = "http://ec.gob.sri.ws.autorizacion";
const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Reception and authorization URLs of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceEndpoints {
    pub reception: String,
    pub authorization: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthorityEndpoints {
    pub test: ServiceEndpoints,
    pub production: ServiceEndpoints,
}

impl AuthorityEndpoints {
    pub fn for_environment(&self, environment: Environment) -> &ServiceEndpoints {
        match environment {
            Environment::Test => &self.test,
            Environment::Production => &self.production,
        }
    }
}

impl Default for AuthorityEndpoints {
    fn default() -> Self {
        Self {
            test: ServiceEndpoints::for_host("celcer.sri.gob.ec"),
            production: ServiceEndpoints::for_host("cel.sri.gob.ec"),
        }
    }
}

impl ServiceEndpoints {
    fn for_host(host: &str) -> Self {
        let base = format!("https://{host}/comprobantes-electronicos-ws");
        Self {
            reception: format!("{base}/RecepcionComprobantesOffline"),
            authorization: format!("{base}/AutorizacionComprobantesOffline"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoapClient {
    client: reqwest::Client,
    endpoints: AuthorityEndpoints,
    timeout: Duration,
}

impl SoapClient {
    pub fn new(endpoints: AuthorityEndpoints, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    async fn post(&self, url: &str, envelope: String, operation: &str) -> Result<String, TransportError> {
        let resp = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml; charset=UTF-8")
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.map_send_error(operation, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| self.map_send_error(operation, e))?;

        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }
        debug!(operation, bytes = body.len(), "authority answered");
        Ok(body)
    }

    fn map_send_error(&self, operation: &str, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if e.is_decode() {
            TransportError::Decode(format!("{operation}: {e}"))
        } else {
            TransportError::Connection(format!("{operation}: {e}"))
        }
    }
}

#[async_trait]
impl TaxAuthorityClient for SoapClient {
    async fn submit(
        &self,
        signed_xml: &[u8],
        environment: Environment,
    ) -> Result<ReceptionResponse, TransportError> {
        let url = &self.endpoints.for_environment(environment).reception;
        let body = self
            .post(url, reception_envelope(signed_xml), "validarComprobante")
            .await?;
        parse_reception(&body)
    }

    async fn authorize(
        &self,
        access_key: &AccessKey,
        environment: Environment,
    ) -> Result<AuthorizationResponse, TransportError> {
        let url = &self.endpoints.for_environment(environment).authorization;
        let body = self
            .post(url, authorization_envelope(access_key), "autorizacionComprobante")
            .await?;
        parse_authorization(&body)
    }
}

pub(crate) fn reception_envelope(signed_xml: &[u8]) -> String {
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:ec="{ns}">"#,
            "<soapenv:Header/><soapenv:Body><ec:validarComprobante>",
            "<xml>{payload}</xml>",
            "</ec:validarComprobante></soapenv:Body></soapenv:Envelope>"
        ),
        env = SOAP_ENV_NS,
        ns = RECEPTION_NS,
        payload = STANDARD.encode(signed_xml),
    )
}

pub(crate) fn authorization_envelope(access_key: &AccessKey) -> String {
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:ec="{ns}">"#,
            "<soapenv:Header/><soapenv:Body><ec:autorizacionComprobante>",
            "<claveAccesoComprobante>{key}</claveAccesoComprobante>",
            "</ec:autorizacionComprobante></soapenv:Body></soapenv:Envelope>"
        ),
        env = SOAP_ENV_NS,
        ns = AUTHORIZATION_NS,
        key = access_key,
    )
}

pub(crate) fn parse_reception(body: &str) -> Result<ReceptionResponse, TransportError> {
    let root = Node::parse(body).map_err(TransportError::Decode)?;
    let answer = root
        .find("RespuestaRecepcionComprobante")
        .ok_or_else(|| TransportError::Decode("missing RespuestaRecepcionComprobante".into()))?;

    let state = match answer.text_of("estado").as_deref() {
        Some("RECIBIDA") => ReceptionState::Received,
        Some("DEVUELTA") => ReceptionState::Returned,
        other => {
            return Err(TransportError::Decode(format!(
                "unknown reception state {other:?}"
            )));
        }
    };

    let messages = answer
        .child("comprobantes")
        .map(|c| {
            c.children_named("comprobante")
                .flat_map(messages_of)
                .collect()
        })
        .unwrap_or_default();

    Ok(ReceptionResponse { state, messages })
}

pub(crate) fn parse_authorization(body: &str) -> Result<AuthorizationResponse, TransportError> {
    let root = Node::parse(body).map_err(TransportError::Decode)?;
    let answer = root
        .find("RespuestaAutorizacionComprobante")
        .ok_or_else(|| {
            TransportError::Decode("missing RespuestaAutorizacionComprobante".into())
        })?;

    let authorizations = answer
        .child("autorizaciones")
        .map(|list| {
            list.children_named("autorizacion")
                .map(parse_authorization_entry)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();

    Ok(AuthorizationResponse {
        access_key: answer.text_of("claveAccesoConsultada"),
        authorizations,
    })
}

fn parse_authorization_entry(node: &Node) -> Result<Authorization, TransportError> {
    let state = match node.text_of("estado").as_deref() {
        Some("AUTORIZADO") => AuthorizationState::Authorized,
        Some("NO AUTORIZADO") | Some("RECHAZADO") | Some("RECHAZADA") => {
            AuthorizationState::NotAuthorized
        }
        Some("EN PROCESO") | Some("EN_PROCESO") => AuthorizationState::InProcess,
        other => {
            return Err(TransportError::Decode(format!(
                "unknown authorization state {other:?}"
            )));
        }
    };

    let date = node
        .text_of("fechaAutorizacion")
        .and_then(|raw| match DateTime::parse_from_rfc3339(&raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                warn!(raw = %raw, error = %e, "unparseable authorization date");
                None
            }
        });

    Ok(Authorization {
        state,
        number: node.text_of("numeroAutorizacion"),
        date,
        messages: messages_of(node),
    })
}

fn messages_of(node: &Node) -> Vec<AuthorityMessage> {
    node.child("mensajes")
        .map(|m| {
            m.children_named("mensaje")
                .map(|msg| AuthorityMessage {
                    identifier: msg.text_of("identificador").unwrap_or_default(),
                    message: msg.text_of("mensaje").unwrap_or_default(),
                    additional_info: msg.text_of("informacionAdicional"),
                    kind: msg.text_of("tipo"),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "1001202601179001234500110010010000000011234567817";

    #[test]
    fn reception_envelope_carries_base64_payload() {
        let envelope = reception_envelope(b"<factura/>");
        assert!(envelope.contains(r#"xmlns:ec="http://ec.gob.sri.ws.recepcion""#));
        assert!(envelope.contains("<xml>PGZhY3R1cmEvPg==</xml>"));
    }

    #[test]
    fn authorization_envelope_carries_the_key() {
        let key = AccessKey::parse(KEY).unwrap();
        let envelope = authorization_envelope(&key);
        assert!(envelope.contains(&format!(
            "<claveAccesoComprobante>{KEY}</claveAccesoComprobante>"
        )));
        assert!(envelope.contains("ec:autorizacionComprobante"));
    }

    #[test]
    fn returned_reception_collects_messages() {
        let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
            <ns2:validarComprobanteResponse xmlns:ns2="http://ec.gob.sri.ws.recepcion">
              <RespuestaRecepcionComprobante>
                <estado>DEVUELTA</estado>
                <comprobantes><comprobante>
                  <claveAcceso>1001202601179001234500110010010000000011234567817</claveAcceso>
                  <mensajes><mensaje>
                    <identificador>43</identificador>
                    <mensaje>CLAVE ACCESO REGISTRADA</mensaje>
                    <informacionAdicional>La clave ya fue registrada</informacionAdicional>
                    <tipo>ERROR</tipo>
                  </mensaje></mensajes>
                </comprobante></comprobantes>
              </RespuestaRecepcionComprobante>
            </ns2:validarComprobanteResponse>
          </soap:Body></soap:Envelope>"#;

        let resp = parse_reception(body).unwrap();
        assert_eq!(resp.state, ReceptionState::Returned);
        assert_eq!(resp.messages.len(), 1);
        assert_eq!(
            resp.messages[0].summary(),
            "43: CLAVE ACCESO REGISTRADA (La clave ya fue registrada)"
        );
    }

    #[test]
    fn authorized_entry_parses_date_and_number() {
        let body = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
            <ns2:autorizacionComprobanteResponse xmlns:ns2="http://ec.gob.sri.ws.autorizacion">
              <RespuestaAutorizacionComprobante>
                <claveAccesoConsultada>1001202601179001234500110010010000000011234567817</claveAccesoConsultada>
                <numeroComprobantes>1</numeroComprobantes>
                <autorizaciones><autorizacion>
                  <estado>AUTORIZADO</estado>
                  <numeroAutorizacion>1001202601179001234500110010010000000011234567817</numeroAutorizacion>
                  <fechaAutorizacion>2026-01-10T10:15:30-05:00</fechaAutorizacion>
                  <ambiente>PRUEBAS</ambiente>
                  <comprobante><![CDATA[<factura id="comprobante"/>]]></comprobante>
                  <mensajes/>
                </autorizacion></autorizaciones>
              </RespuestaAutorizacionComprobante>
            </ns2:autorizacionComprobanteResponse>
          </soap:Body></soap:Envelope>"#;

        let resp = parse_authorization(body).unwrap();
        let auth = resp.first().unwrap();
        assert_eq!(auth.state, AuthorizationState::Authorized);
        assert_eq!(auth.number.as_deref(), Some(KEY));
        assert_eq!(
            auth.date.unwrap().to_rfc3339(),
            "2026-01-10T15:15:30+00:00"
        );
        assert_eq!(resp.access_key.as_deref(), Some(KEY));
    }

    #[test]
    fn empty_authorization_list_is_not_an_error() {
        let body = r#"<Envelope><Body><RespuestaAutorizacionComprobante>
              <claveAccesoConsultada>x</claveAccesoConsultada>
              <numeroComprobantes>0</numeroComprobantes>
              <autorizaciones/>
            </RespuestaAutorizacionComprobante></Body></Envelope>"#;
        let resp = parse_authorization(body).unwrap();
        assert!(resp.first().is_none());
    }

    #[test]
    fn unknown_states_are_decode_errors() {
        let body = "<RespuestaRecepcionComprobante><estado>QUIZAS</estado></RespuestaRecepcionComprobante>";
        assert!(matches!(
            parse_reception(body),
            Err(TransportError::Decode(_))
        ));
    }

    #[test]
    fn default_endpoints_follow_environment() {
        let endpoints = AuthorityEndpoints::default();
        assert!(
            endpoints
                .for_environment(Environment::Test)
                .reception
                .starts_with("https://celcer.sri.gob.ec/")
        );
        assert!(
            endpoints
                .for_environment(Environment::Production)
                .authorization
                .ends_with("/AutorizacionComprobantesOffline")
        );
    }
}
