mod gemini_tests;
mod transport_tests;
