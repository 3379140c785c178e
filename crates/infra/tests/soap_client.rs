//! SoapClient against a wiremock stand-in for the authority's web services.

use std::time::Duration;

use einvoice_fiscal::{AccessKey, Environment};
use einvoice_infra::authority::{
    AuthorityEndpoints, AuthorizationState, ReceptionState, ServiceEndpoints, SoapClient,
    TaxAuthorityClient, TransportError,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "1001202601179001234500110010010000000011234567817";

fn client(server: &MockServer, timeout: Duration) -> SoapClient {
    let test = ServiceEndpoints {
        reception: format!("{}/test/recepcion", server.uri()),
        authorization: format!("{}/test/autorizacion", server.uri()),
    };
    let production = ServiceEndpoints {
        reception: format!("{}/prod/recepcion", server.uri()),
        authorization: format!("{}/prod/autorizacion", server.uri()),
    };
    SoapClient::new(AuthorityEndpoints { test, production }, timeout).expect("client")
}

fn reception_body(state: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
<ns2:validarComprobanteResponse xmlns:ns2="http://ec.gob.sri.ws.recepcion">
<RespuestaRecepcionComprobante><estado>{state}</estado><comprobantes/></RespuestaRecepcionComprobante>
</ns2:validarComprobanteResponse></soap:Body></soap:Envelope>"#
    )
}

#[tokio::test]
async fn submit_posts_soap_to_the_environment_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/test/recepcion"))
        .and(header("content-type", "text/xml; charset=UTF-8"))
        .and(body_string_contains("<ec:validarComprobante><xml>PGZhY3R1cmEvPg==</xml>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(reception_body("RECIBIDA")))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(&server, Duration::from_secs(5))
        .submit(b"<factura/>", Environment::Test)
        .await
        .expect("submit");
    assert_eq!(resp.state, ReceptionState::Received);
    assert!(resp.messages.is_empty());
}

#[tokio::test]
async fn production_uses_its_own_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prod/autorizacion"))
        .and(body_string_contains(KEY))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
<ns2:autorizacionComprobanteResponse xmlns:ns2="http://ec.gob.sri.ws.autorizacion">
<RespuestaAutorizacionComprobante>
<claveAccesoConsultada>1001202601179001234500110010010000000011234567817</claveAccesoConsultada>
<numeroComprobantes>1</numeroComprobantes>
<autorizaciones><autorizacion>
<estado>NO AUTORIZADO</estado>
<mensajes><mensaje><identificador>56</identificador><mensaje>ERROR ESTABLECIMIENTO CERRADO</mensaje><tipo>ERROR</tipo></mensaje></mensajes>
</autorizacion></autorizaciones>
</RespuestaAutorizacionComprobante>
</ns2:autorizacionComprobanteResponse></soap:Body></soap:Envelope>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let key = AccessKey::parse(KEY).unwrap();
    let resp = client(&server, Duration::from_secs(5))
        .authorize(&key, Environment::Production)
        .await
        .expect("authorize");
    let auth = resp.first().expect("one authorization");
    assert_eq!(auth.state, AuthorizationState::NotAuthorized);
    assert_eq!(auth.messages[0].summary(), "56: ERROR ESTABLECIMIENTO CERRADO");
}

#[tokio::test]
async fn server_errors_are_http_status_not_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("mantenimiento"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .submit(b"<factura/>", Environment::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::HttpStatus { status: 503, .. }));
    assert!(!err.is_network());
}

#[tokio::test]
async fn slow_authority_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(reception_body("RECIBIDA"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_millis(50))
        .submit(b"<factura/>", Environment::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert!(err.is_network());
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client(&server, Duration::from_secs(5))
        .submit(b"<factura/>", Environment::Test)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Decode(_)));
}

#[tokio::test]
async fn unreachable_authority_is_a_connection_error() {
    let endpoints = AuthorityEndpoints {
        test: ServiceEndpoints {
            reception: "http://127.0.0.1:9/recepcion".into(),
            authorization: "http://127.0.0.1:9/autorizacion".into(),
        },
        production: ServiceEndpoints {
            reception: "http://127.0.0.1:9/recepcion".into(),
            authorization: "http://127.0.0.1:9/autorizacion".into(),
        },
    };
    let client = SoapClient::new(endpoints, Duration::from_secs(2)).unwrap();
    let err = client
        .submit(b"<factura/>", Environment::Test)
        .await
        .unwrap_err();
    assert!(err.is_network());
}
