//! Output Format Table
//!
//! Static mapping of the audio output formats the read-aloud endpoint accepts
//! to the MIME content type of the bytes it produces. The session forwards the
//! identifier verbatim; only callers look up the content type.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "raw-16khz-16bit-mono-pcm")]
    Raw16Khz16BitMonoPcm,
    #[serde(rename = "raw-48khz-16bit-mono-pcm")]
    Raw48Khz16BitMonoPcm,
    #[serde(rename = "raw-8khz-8bit-mono-mulaw")]
    Raw8Khz8BitMonoMulaw,
    #[serde(rename = "raw-8khz-8bit-mono-alaw")]
    Raw8Khz8BitMonoAlaw,
    #[serde(rename = "raw-16khz-16bit-mono-truesilk")]
    Raw16Khz16BitMonoTrueSilk,
    #[serde(rename = "raw-24khz-16bit-mono-truesilk")]
    Raw24Khz16BitMonoTrueSilk,
    #[serde(rename = "riff-16khz-16bit-mono-pcm")]
    Riff16Khz16BitMonoPcm,
    #[serde(rename = "riff-24khz-16bit-mono-pcm")]
    Riff24Khz16BitMonoPcm,
    #[serde(rename = "riff-48khz-16bit-mono-pcm")]
    Riff48Khz16BitMonoPcm,
    #[serde(rename = "riff-8khz-8bit-mono-mulaw")]
    Riff8Khz8BitMonoMulaw,
    #[serde(rename = "riff-8khz-8bit-mono-alaw")]
    Riff8Khz8BitMonoAlaw,
    #[serde(rename = "audio-16khz-32kbitrate-mono-mp3")]
    Audio16Khz32KBitRateMonoMp3,
    #[serde(rename = "audio-16khz-64kbitrate-mono-mp3")]
    Audio16Khz64KBitRateMonoMp3,
    #[serde(rename = "audio-16khz-128kbitrate-mono-mp3")]
    Audio16Khz128KBitRateMonoMp3,
    #[default]
    #[serde(rename = "audio-24khz-48kbitrate-mono-mp3")]
    Audio24Khz48KBitRateMonoMp3,
    #[serde(rename = "audio-24khz-96kbitrate-mono-mp3")]
    Audio24Khz96KBitRateMonoMp3,
    #[serde(rename = "audio-24khz-160kbitrate-mono-mp3")]
    Audio24Khz160KBitRateMonoMp3,
    #[serde(rename = "audio-48khz-96kbitrate-mono-mp3")]
    Audio48Khz96KBitRateMonoMp3,
    #[serde(rename = "audio-48khz-192kbitrate-mono-mp3")]
    Audio48Khz192KBitRateMonoMp3,
    #[serde(rename = "webm-16khz-16bit-mono-opus")]
    Webm16Khz16BitMonoOpus,
    #[serde(rename = "webm-24khz-16bit-mono-opus")]
    Webm24Khz16BitMonoOpus,
    #[serde(rename = "ogg-16khz-16bit-mono-opus")]
    Ogg16Khz16BitMonoOpus,
    #[serde(rename = "ogg-24khz-16bit-mono-opus")]
    Ogg24Khz16BitMonoOpus,
    #[serde(rename = "ogg-48khz-16bit-mono-opus")]
    Ogg48Khz16BitMonoOpus,
}

use OutputFormat::*;

const ALL: [OutputFormat; 24] = [
    Raw16Khz16BitMonoPcm,
    Raw48Khz16BitMonoPcm,
    Raw8Khz8BitMonoMulaw,
    Raw8Khz8BitMonoAlaw,
    Raw16Khz16BitMonoTrueSilk,
    Raw24Khz16BitMonoTrueSilk,
    Riff16Khz16BitMonoPcm,
    Riff24Khz16BitMonoPcm,
    Riff48Khz16BitMonoPcm,
    Riff8Khz8BitMonoMulaw,
    Riff8Khz8BitMonoAlaw,
    Audio16Khz32KBitRateMonoMp3,
    Audio16Khz64KBitRateMonoMp3,
    Audio16Khz128KBitRateMonoMp3,
    Audio24Khz48KBitRateMonoMp3,
    Audio24Khz96KBitRateMonoMp3,
    Audio24Khz160KBitRateMonoMp3,
    Audio48Khz96KBitRateMonoMp3,
    Audio48Khz192KBitRateMonoMp3,
    Webm16Khz16BitMonoOpus,
    Webm24Khz16BitMonoOpus,
    Ogg16Khz16BitMonoOpus,
    Ogg24Khz16BitMonoOpus,
    Ogg48Khz16BitMonoOpus,
];

impl OutputFormat {
    /// Every supported format.
    pub fn all() -> impl Iterator<Item = OutputFormat> {
        ALL.into_iter()
    }

    /// The identifier sent in the `speech.config` frame.
    pub fn as_str(self) -> &'static str {
        self.entry().0
    }

    /// The MIME type of audio produced in this format.
    pub fn content_type(self) -> &'static str {
        self.entry().1
    }

    // (wire identifier, content type)
    fn entry(self) -> (&'static str, &'static str) {
        match self {
            Raw16Khz16BitMonoPcm => ("raw-16khz-16bit-mono-pcm", "audio/basic"),
            Raw48Khz16BitMonoPcm => ("raw-48khz-16bit-mono-pcm", "audio/basic"),
            Raw8Khz8BitMonoMulaw => ("raw-8khz-8bit-mono-mulaw", "audio/basic"),
            Raw8Khz8BitMonoAlaw => ("raw-8khz-8bit-mono-alaw", "audio/basic"),
            Raw16Khz16BitMonoTrueSilk => ("raw-16khz-16bit-mono-truesilk", "audio/SILK"),
            Raw24Khz16BitMonoTrueSilk => ("raw-24khz-16bit-mono-truesilk", "audio/SILK"),
            Riff16Khz16BitMonoPcm => ("riff-16khz-16bit-mono-pcm", "audio/x-wav"),
            Riff24Khz16BitMonoPcm => ("riff-24khz-16bit-mono-pcm", "audio/x-wav"),
            Riff48Khz16BitMonoPcm => ("riff-48khz-16bit-mono-pcm", "audio/x-wav"),
            Riff8Khz8BitMonoMulaw => ("riff-8khz-8bit-mono-mulaw", "audio/x-wav"),
            Riff8Khz8BitMonoAlaw => ("riff-8khz-8bit-mono-alaw", "audio/x-wav"),
            Audio16Khz32KBitRateMonoMp3 => ("audio-16khz-32kbitrate-mono-mp3", "audio/mpeg"),
            Audio16Khz64KBitRateMonoMp3 => ("audio-16khz-64kbitrate-mono-mp3", "audio/mpeg"),
            Audio16Khz128KBitRateMonoMp3 => ("audio-16khz-128kbitrate-mono-mp3", "audio/mpeg"),
            Audio24Khz48KBitRateMonoMp3 => ("audio-24khz-48kbitrate-mono-mp3", "audio/mpeg"),
            Audio24Khz96KBitRateMonoMp3 => ("audio-24khz-96kbitrate-mono-mp3", "audio/mpeg"),
            Audio24Khz160KBitRateMonoMp3 => ("audio-24khz-160kbitrate-mono-mp3", "audio/mpeg"),
            Audio48Khz96KBitRateMonoMp3 => ("audio-48khz-96kbitrate-mono-mp3", "audio/mpeg"),
            Audio48Khz192KBitRateMonoMp3 => ("audio-48khz-192kbitrate-mono-mp3", "audio/mpeg"),
            Webm16Khz16BitMonoOpus => ("webm-16khz-16bit-mono-opus", "audio/webm; codec=opus"),
            Webm24Khz16BitMonoOpus => ("webm-24khz-16bit-mono-opus", "audio/webm; codec=opus"),
            Ogg16Khz16BitMonoOpus => ("ogg-16khz-16bit-mono-opus", "audio/ogg; codecs=opus; rate=16000"),
            Ogg24Khz16BitMonoOpus => ("ogg-24khz-16bit-mono-opus", "audio/ogg; codecs=opus; rate=24000"),
            Ogg48Khz16BitMonoOpus => ("ogg-48khz-16bit-mono-opus", "audio/ogg; codecs=opus; rate=48000"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported output format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OutputFormat::all()
            .find(|format| format.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownFormat(s.to_string()))
    }
}
